use super::ioctl::{
    SNDRV_PCM_HW_PARAM_ACCESS, SNDRV_PCM_HW_PARAM_BUFFER_BYTES, SNDRV_PCM_HW_PARAM_BUFFER_SIZE,
    SNDRV_PCM_HW_PARAM_BUFFER_TIME, SNDRV_PCM_HW_PARAM_CHANNELS, SNDRV_PCM_HW_PARAM_FORMAT,
    SNDRV_PCM_HW_PARAM_FRAME_BITS, SNDRV_PCM_HW_PARAM_PERIOD_BYTES, SNDRV_PCM_HW_PARAM_PERIOD_SIZE,
    SNDRV_PCM_HW_PARAM_PERIOD_TIME, SNDRV_PCM_HW_PARAM_PERIODS, SNDRV_PCM_HW_PARAM_RATE,
    SNDRV_PCM_HW_PARAM_SAMPLE_BITS, SNDRV_PCM_HW_PARAM_SUBFORMAT, SNDRV_PCM_SUBFORMAT_STD,
    SndMask, SndPcmHwParams,
};
use nix::libc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: u32,
    pub max: u32,
}

impl Range {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// What a virtual device supports, applied to parameter records the way a
/// kernel driver applies its own hardware rules.
///
/// `access` and `format` are bit sets indexed like the kernel masks
/// (bit 3 is RW_INTERLEAVED, bit 2 of `format` is S16_LE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwConstraints {
    pub access: u64,
    pub format: u64,
    pub bit_width: Range,
    pub channels: Range,
    pub rate: Range,
    pub periods: Range,
    pub period_bytes: Range,
}

fn einval() -> std::io::Error {
    std::io::Error::from_raw_os_error(libc::EINVAL)
}

fn mask_from_bits(bits: u64) -> SndMask {
    let mut mask = SndMask::empty();
    mask.bits[0] = bits as u32;
    mask.bits[1] = (bits >> 32) as u32;
    mask
}

impl HwConstraints {
    /// Narrows `params` to the supported space. Fails with `EINVAL` when
    /// nothing is left.
    pub fn refine(&self, params: &mut SndPcmHwParams) -> std::io::Result<()> {
        let allowed = [
            (SNDRV_PCM_HW_PARAM_ACCESS, mask_from_bits(self.access)),
            (SNDRV_PCM_HW_PARAM_FORMAT, mask_from_bits(self.format)),
            (
                SNDRV_PCM_HW_PARAM_SUBFORMAT,
                mask_from_bits(1 << SNDRV_PCM_SUBFORMAT_STD),
            ),
        ];
        for (param, mask) in allowed {
            if let Some(m) = params.mask_mut(param) {
                m.intersect(&mask);
                if m.is_empty() {
                    return Err(einval());
                }
            }
        }

        let ranges = [
            (SNDRV_PCM_HW_PARAM_SAMPLE_BITS, self.bit_width),
            (SNDRV_PCM_HW_PARAM_CHANNELS, self.channels),
            (SNDRV_PCM_HW_PARAM_RATE, self.rate),
            (SNDRV_PCM_HW_PARAM_PERIODS, self.periods),
            (SNDRV_PCM_HW_PARAM_PERIOD_BYTES, self.period_bytes),
        ];
        for (param, range) in ranges {
            if let Some(interval) = params.interval_mut(param) {
                interval.clamp_to(range.min, range.max);
            }
        }

        // Period size follows from period bytes once the frame width is known.
        let frame_bits = params
            .interval(SNDRV_PCM_HW_PARAM_FRAME_BITS)
            .and_then(|i| i.single());
        if let Some(frame_bits) = frame_bits.filter(|b| *b >= 8) {
            let frame_bytes = frame_bits / 8;
            let lo = self.period_bytes.min.div_ceil(frame_bytes);
            let hi = self.period_bytes.max / frame_bytes;
            if let Some(interval) = params.interval_mut(SNDRV_PCM_HW_PARAM_PERIOD_SIZE) {
                interval.clamp_to(lo, hi);
            }
        }

        if params.intervals.iter().any(|i| i.is_empty()) {
            return Err(einval());
        }
        params.rmask = 0;
        Ok(())
    }

    /// Refines and then settles every parameter on one value: the lowest
    /// remaining mask bit and interval minimum, with the derived sizes and
    /// times filled in.
    pub fn choose(&self, params: &mut SndPcmHwParams) -> std::io::Result<()> {
        self.refine(params)?;
        for param in [
            SNDRV_PCM_HW_PARAM_ACCESS,
            SNDRV_PCM_HW_PARAM_FORMAT,
            SNDRV_PCM_HW_PARAM_SUBFORMAT,
        ] {
            if let Some(mask) = params.mask_mut(param) {
                let first = mask.first().ok_or_else(einval)?;
                mask.set_only(first);
            }
        }

        let mut pick = |param: u32| -> std::io::Result<u32> {
            let interval = params.interval_mut(param).ok_or_else(einval)?;
            let value = interval.min;
            interval.set_integer(value);
            Ok(value)
        };
        let sample_bits = pick(SNDRV_PCM_HW_PARAM_SAMPLE_BITS)?;
        let channels = pick(SNDRV_PCM_HW_PARAM_CHANNELS)?;
        let rate = pick(SNDRV_PCM_HW_PARAM_RATE)?;
        let periods = pick(SNDRV_PCM_HW_PARAM_PERIODS)?;
        let period_size = pick(SNDRV_PCM_HW_PARAM_PERIOD_SIZE)?;
        if rate == 0 || period_size == 0 || periods == 0 {
            return Err(einval());
        }

        let frame_bits = sample_bits.saturating_mul(channels);
        let buffer_size = period_size.saturating_mul(periods);
        let derived = [
            (SNDRV_PCM_HW_PARAM_FRAME_BITS, frame_bits),
            (
                SNDRV_PCM_HW_PARAM_PERIOD_BYTES,
                period_size.saturating_mul(frame_bits) / 8,
            ),
            (SNDRV_PCM_HW_PARAM_BUFFER_SIZE, buffer_size),
            (
                SNDRV_PCM_HW_PARAM_BUFFER_BYTES,
                buffer_size.saturating_mul(frame_bits) / 8,
            ),
            (
                SNDRV_PCM_HW_PARAM_PERIOD_TIME,
                (u64::from(period_size) * 1_000_000 / u64::from(rate)) as u32,
            ),
            (
                SNDRV_PCM_HW_PARAM_BUFFER_TIME,
                (u64::from(buffer_size) * 1_000_000 / u64::from(rate)) as u32,
            ),
        ];
        for (param, value) in derived {
            if let Some(interval) = params.interval_mut(param) {
                interval.set_integer(value);
            }
        }
        params.rate_num = rate;
        params.rate_den = 1;
        params.msbits = sample_bits;
        params.cmask = 0;
        Ok(())
    }
}
