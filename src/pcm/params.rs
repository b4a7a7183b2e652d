//! Hardware parameter sets: the mask/interval record a stream negotiates
//! with its driver.

use super::driver::PcmDriver;
use super::ioctl::*;
use super::options::{PcmFlags, StreamConfig};
use crate::error::Error;
use crate::format::PcmFormat;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmParam {
    Access,
    Format,
    Subformat,
    SampleBits,
    FrameBits,
    Channels,
    Rate,
    PeriodTime,
    PeriodSize,
    PeriodBytes,
    Periods,
    BufferTime,
    BufferSize,
    BufferBytes,
    TickTime,
}

impl PcmParam {
    pub const ALL: [PcmParam; 15] = [
        Self::Access,
        Self::Format,
        Self::Subformat,
        Self::SampleBits,
        Self::FrameBits,
        Self::Channels,
        Self::Rate,
        Self::PeriodTime,
        Self::PeriodSize,
        Self::PeriodBytes,
        Self::Periods,
        Self::BufferTime,
        Self::BufferSize,
        Self::BufferBytes,
        Self::TickTime,
    ];

    pub fn to_alsa(self) -> u32 {
        match self {
            Self::Access => SNDRV_PCM_HW_PARAM_ACCESS,
            Self::Format => SNDRV_PCM_HW_PARAM_FORMAT,
            Self::Subformat => SNDRV_PCM_HW_PARAM_SUBFORMAT,
            Self::SampleBits => SNDRV_PCM_HW_PARAM_SAMPLE_BITS,
            Self::FrameBits => SNDRV_PCM_HW_PARAM_FRAME_BITS,
            Self::Channels => SNDRV_PCM_HW_PARAM_CHANNELS,
            Self::Rate => SNDRV_PCM_HW_PARAM_RATE,
            Self::PeriodTime => SNDRV_PCM_HW_PARAM_PERIOD_TIME,
            Self::PeriodSize => SNDRV_PCM_HW_PARAM_PERIOD_SIZE,
            Self::PeriodBytes => SNDRV_PCM_HW_PARAM_PERIOD_BYTES,
            Self::Periods => SNDRV_PCM_HW_PARAM_PERIODS,
            Self::BufferTime => SNDRV_PCM_HW_PARAM_BUFFER_TIME,
            Self::BufferSize => SNDRV_PCM_HW_PARAM_BUFFER_SIZE,
            Self::BufferBytes => SNDRV_PCM_HW_PARAM_BUFFER_BYTES,
            Self::TickTime => SNDRV_PCM_HW_PARAM_TICK_TIME,
        }
    }

    pub fn is_mask(self) -> bool {
        matches!(self, Self::Access | Self::Format | Self::Subformat)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Access => "Access",
            Self::Format => "Format",
            Self::Subformat => "Subformat",
            Self::SampleBits => "Sample bits",
            Self::FrameBits => "Frame bits",
            Self::Channels => "Channels",
            Self::Rate => "Rate",
            Self::PeriodTime => "Period time",
            Self::PeriodSize => "Period size",
            Self::PeriodBytes => "Period bytes",
            Self::Periods => "Period count",
            Self::BufferTime => "Buffer time",
            Self::BufferSize => "Buffer size",
            Self::BufferBytes => "Buffer bytes",
            Self::TickTime => "Tick time",
        }
    }
}

impl TryFrom<u32> for PcmParam {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|p| p.to_alsa() == value)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown hw parameter index {value}")))
    }
}

fn access_name(bit: u32) -> Option<&'static str> {
    match bit {
        SNDRV_PCM_ACCESS_MMAP_INTERLEAVED => Some("MMAP_INTERLEAVED"),
        SNDRV_PCM_ACCESS_MMAP_NONINTERLEAVED => Some("MMAP_NONINTERLEAVED"),
        SNDRV_PCM_ACCESS_MMAP_COMPLEX => Some("MMAP_COMPLEX"),
        SNDRV_PCM_ACCESS_RW_INTERLEAVED => Some("RW_INTERLEAVED"),
        SNDRV_PCM_ACCESS_RW_NONINTERLEAVED => Some("RW_NONINTERLEAVED"),
        _ => None,
    }
}

fn subformat_name(bit: u32) -> Option<&'static str> {
    match bit {
        SNDRV_PCM_SUBFORMAT_STD => Some("STD"),
        _ => None,
    }
}

/// Parameter record in the kernel layout. Starts fully open and only ever
/// narrows as the driver refines it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwParamSet {
    raw: SndPcmHwParams,
}

impl Default for HwParamSet {
    fn default() -> Self {
        Self::any()
    }
}

impl HwParamSet {
    /// Every mask bit set, every interval `[0, u32::MAX]`.
    pub fn any() -> Self {
        let mut raw = SndPcmHwParams::zeroed();
        raw.masks = [SndMask::full(); 3];
        raw.intervals = [SndInterval::full(); 12];
        raw.rmask = !0;
        raw.cmask = 0;
        raw.info = !0;
        Self { raw }
    }

    /// Request for `config`: interleaved access, one format, exact sample and
    /// frame widths, channels, rate and period count, and a period size
    /// floor the driver is free to raise.
    pub fn from_config(config: &StreamConfig, flags: PcmFlags) -> Self {
        let mut params = Self::any();
        let access = if flags.contains(PcmFlags::MMAP) {
            SNDRV_PCM_ACCESS_MMAP_INTERLEAVED
        } else {
            SNDRV_PCM_ACCESS_RW_INTERLEAVED
        };
        let bits = config.format.physical_bits();
        params.set_mask_bit(PcmParam::Access, access);
        params.set_mask_bit(PcmParam::Format, config.format.to_alsa());
        params.set_mask_bit(PcmParam::Subformat, SNDRV_PCM_SUBFORMAT_STD);
        params.set_min(PcmParam::PeriodSize, config.period_size);
        params.set_int(PcmParam::SampleBits, bits);
        params.set_int(PcmParam::FrameBits, bits.saturating_mul(config.channels));
        params.set_int(PcmParam::Channels, config.channels);
        params.set_int(PcmParam::Periods, config.period_count);
        params.set_int(PcmParam::Rate, config.rate);
        if flags.contains(PcmFlags::NOIRQ) {
            params.raw.flags |= SNDRV_PCM_HW_PARAMS_NO_PERIOD_WAKEUP;
        }
        params
    }

    pub fn from_raw(raw: SndPcmHwParams) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &SndPcmHwParams {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut SndPcmHwParams {
        &mut self.raw
    }

    pub fn mask(&self, param: PcmParam) -> Option<&SndMask> {
        self.raw.mask(param.to_alsa())
    }

    pub fn interval(&self, param: PcmParam) -> Option<&SndInterval> {
        self.raw.interval(param.to_alsa())
    }

    /// Restricts a mask parameter to the single value `bit`.
    pub fn set_mask_bit(&mut self, param: PcmParam, bit: u32) {
        if let Some(mask) = self.raw.mask_mut(param.to_alsa()) {
            mask.set_only(bit);
        }
    }

    pub fn set_min(&mut self, param: PcmParam, value: u32) {
        if let Some(interval) = self.raw.interval_mut(param.to_alsa()) {
            interval.min = value;
        }
    }

    pub fn set_max(&mut self, param: PcmParam, value: u32) {
        if let Some(interval) = self.raw.interval_mut(param.to_alsa()) {
            interval.max = value;
        }
    }

    pub fn set_int(&mut self, param: PcmParam, value: u32) {
        if let Some(interval) = self.raw.interval_mut(param.to_alsa()) {
            interval.set_integer(value);
        }
    }

    /// Lower bound of an interval parameter, 0 for mask parameters.
    pub fn min(&self, param: PcmParam) -> u32 {
        self.interval(param).map_or(0, |i| i.min)
    }

    /// Upper bound of an interval parameter, 0 for mask parameters.
    pub fn max(&self, param: PcmParam) -> u32 {
        self.interval(param).map_or(0, |i| i.max)
    }

    /// The value an interval has been pinned to, if it is pinned.
    pub fn single_value(&self, param: PcmParam) -> Option<u32> {
        self.interval(param).and_then(SndInterval::single)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.masks.iter().any(SndMask::is_empty)
            || self.raw.intervals.iter().any(SndInterval::is_empty)
    }

    /// Intersects with `other`. Nothing is widened.
    pub fn narrow_to(&mut self, other: &HwParamSet) {
        for (mask, o) in self.raw.masks.iter_mut().zip(other.raw.masks.iter()) {
            mask.intersect(o);
        }
        for (interval, o) in self
            .raw
            .intervals
            .iter_mut()
            .zip(other.raw.intervals.iter())
        {
            interval.clamp_to(o.min, o.max);
            interval.flags |= o.flags & SND_INTERVAL_INTEGER;
        }
    }

    pub fn formats(&self) -> Vec<PcmFormat> {
        self.mask(PcmParam::Format)
            .map(|m| m.iter().filter_map(PcmFormat::from_alsa).collect())
            .unwrap_or_default()
    }

    pub fn supports_format(&self, format: PcmFormat) -> bool {
        self.mask(PcmParam::Format)
            .is_some_and(|m| m.test(format.to_alsa()))
    }

    /// HW_REFINE: the driver narrows the set to what it supports.
    pub fn refine(&mut self, driver: &mut dyn PcmDriver) -> std::io::Result<()> {
        driver.hw_refine(&mut self.raw)
    }

    /// HW_PARAMS: the driver picks concrete values and installs them.
    pub fn install(&mut self, driver: &mut dyn PcmDriver) -> std::io::Result<()> {
        driver.hw_params(&mut self.raw)
    }

    /// Everything the driver can do, starting from a fully open set.
    pub fn query_capabilities(driver: &mut dyn PcmDriver) -> std::io::Result<Self> {
        let mut params = Self::any();
        params.refine(driver)?;
        Ok(params)
    }
}

impl fmt::Display for HwParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for param in PcmParam::ALL {
            if let Some(mask) = self.mask(param) {
                write!(f, "{:>12}:", param.name())?;
                // Bits without a known name are skipped.
                for bit in mask.iter() {
                    let name = match param {
                        PcmParam::Access => access_name(bit),
                        PcmParam::Format => PcmFormat::from_alsa(bit).map(PcmFormat::name),
                        _ => subformat_name(bit),
                    };
                    if let Some(name) = name {
                        write!(f, " {name}")?;
                    }
                }
                writeln!(f)?;
            } else if let Some(interval) = self.interval(param) {
                writeln!(
                    f,
                    "{:>12}:\tmin={}\t\tmax={}",
                    param.name(),
                    interval.min,
                    interval.max
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_is_fully_open() {
        let params = HwParamSet::any();
        assert_eq!(params.min(PcmParam::Rate), 0);
        assert_eq!(params.max(PcmParam::Rate), u32::MAX);
        assert!(params.supports_format(PcmFormat::S16Le));
        assert_eq!(params.raw().rmask, !0);
        assert_eq!(params.raw().cmask, 0);
        assert_eq!(params.raw().info, !0);
        assert!(!params.is_empty());
    }

    #[test]
    fn request_pins_everything_but_period_size() {
        let config = StreamConfig {
            channels: 2,
            rate: 48000,
            period_size: 1024,
            period_count: 3,
            format: PcmFormat::S16Le,
            ..StreamConfig::default()
        };
        let params = HwParamSet::from_config(&config, PcmFlags::empty());
        assert_eq!(params.formats(), vec![PcmFormat::S16Le]);
        let access = params.mask(PcmParam::Access).expect("access mask");
        assert_eq!(access.first(), Some(SNDRV_PCM_ACCESS_RW_INTERLEAVED));
        assert_eq!(params.single_value(PcmParam::SampleBits), Some(16));
        assert_eq!(params.single_value(PcmParam::FrameBits), Some(32));
        assert_eq!(params.single_value(PcmParam::Channels), Some(2));
        assert_eq!(params.single_value(PcmParam::Periods), Some(3));
        assert_eq!(params.single_value(PcmParam::Rate), Some(48000));
        assert_eq!(params.min(PcmParam::PeriodSize), 1024);
        assert_eq!(params.max(PcmParam::PeriodSize), u32::MAX);
        assert_eq!(params.raw().flags & SNDRV_PCM_HW_PARAMS_NO_PERIOD_WAKEUP, 0);
    }

    #[test]
    fn mmap_and_noirq_flags_shape_request() {
        let params = HwParamSet::from_config(
            &StreamConfig::default(),
            PcmFlags::MMAP | PcmFlags::NOIRQ,
        );
        let access = params.mask(PcmParam::Access).expect("access mask");
        assert_eq!(access.first(), Some(SNDRV_PCM_ACCESS_MMAP_INTERLEAVED));
        assert_ne!(params.raw().flags & SNDRV_PCM_HW_PARAMS_NO_PERIOD_WAKEUP, 0);
    }

    #[test]
    fn mask_queries_on_intervals_are_absent() {
        let params = HwParamSet::any();
        assert!(params.mask(PcmParam::Rate).is_none());
        assert!(params.interval(PcmParam::Format).is_none());
        assert_eq!(params.min(PcmParam::Format), 0);
        assert_eq!(params.max(PcmParam::Access), 0);
    }

    #[test]
    fn narrowing_is_monotonic() {
        let mut wide = HwParamSet::any();
        let mut device = HwParamSet::any();
        device.set_min(PcmParam::Rate, 8000);
        device.set_max(PcmParam::Rate, 96000);
        device.set_mask_bit(PcmParam::Format, PcmFormat::S32Le.to_alsa());
        wide.narrow_to(&device);
        assert_eq!(wide.min(PcmParam::Rate), 8000);
        assert_eq!(wide.max(PcmParam::Rate), 96000);
        assert_eq!(wide.formats(), vec![PcmFormat::S32Le]);

        let mut again = wide.clone();
        again.narrow_to(&HwParamSet::any());
        assert_eq!(again, wide);
    }

    #[test]
    fn param_index_round_trip() {
        assert_eq!(PcmParam::try_from(11).ok(), Some(PcmParam::Rate));
        assert!(PcmParam::try_from(5).is_err());
        assert!(PcmParam::Subformat.is_mask());
        assert!(!PcmParam::TickTime.is_mask());
    }

    #[test]
    fn display_lists_masks_and_ranges() {
        let mut params = HwParamSet::any();
        params.set_mask_bit(PcmParam::Format, PcmFormat::S16Le.to_alsa());
        params.set_min(PcmParam::Rate, 44100);
        params.set_max(PcmParam::Rate, 48000);
        let text = params.to_string();
        assert!(text.contains("Format: S16_LE\n"));
        assert!(text.contains("min=44100"));
        assert!(text.contains("max=48000"));
    }
}
