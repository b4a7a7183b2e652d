use crate::error::{Error, Result};
use crate::format::PcmFormat;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Open flags. The bit values are the ones the C library exposes, so
    /// flag words persisted by other tools keep their meaning.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PcmFlags: u32 {
        /// Playback is the default; `IN` opens the capture node.
        const IN = 0x1000_0000;
        /// Transfer through the mapped data buffer instead of READI/WRITEI.
        const MMAP = 0x0000_0001;
        /// Ask the driver not to wake up on every period.
        const NOIRQ = 0x0000_0002;
        /// Report xruns instead of restarting the stream.
        const NORESTART = 0x0000_0004;
        /// Timestamp with CLOCK_MONOTONIC.
        const MONOTONIC = 0x0000_0008;
        /// Fail with `WouldBlock` instead of sleeping.
        const NONBLOCK = 0x0000_0010;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Playback,
    Capture,
}

impl Direction {
    pub fn from_flags(flags: PcmFlags) -> Self {
        if flags.contains(PcmFlags::IN) {
            Self::Capture
        } else {
            Self::Playback
        }
    }

    /// Suffix of the device node name.
    pub fn suffix(self) -> char {
        match self {
            Self::Playback => 'p',
            Self::Capture => 'c',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Capture => "capture",
        }
    }
}

/// Requested stream shape. Zero thresholds take their computed defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub channels: u32,
    pub rate: u32,
    pub period_size: u32,
    pub period_count: u32,
    pub format: PcmFormat,
    pub start_threshold: u64,
    pub stop_threshold: u64,
    pub silence_threshold: u64,
    pub silence_size: u64,
    pub avail_min: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            rate: 48_000,
            period_size: 1024,
            period_count: 4,
            format: PcmFormat::S16Le,
            start_threshold: 0,
            stop_threshold: 0,
            silence_threshold: 0,
            silence_size: 0,
            avail_min: 0,
        }
    }
}

impl StreamConfig {
    pub fn buffer_size(&self) -> u64 {
        u64::from(self.period_size) * u64::from(self.period_count)
    }

    pub fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    pub fn effective_start_threshold(&self) -> u64 {
        if self.start_threshold == 0 {
            self.buffer_size()
        } else {
            self.start_threshold
        }
    }

    pub fn effective_stop_threshold(&self) -> u64 {
        if self.stop_threshold == 0 {
            self.buffer_size()
        } else {
            self.stop_threshold
        }
    }

    pub fn effective_avail_min(&self) -> u64 {
        self.avail_min.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::InvalidArgument("channels must be non-zero".into()));
        }
        if self.rate == 0 {
            return Err(Error::InvalidArgument("rate must be non-zero".into()));
        }
        if self.period_size == 0 || self.period_count == 0 {
            return Err(Error::InvalidArgument(format!(
                "period_size {} x period_count {} leaves no buffer",
                self.period_size, self.period_count
            )));
        }
        if self.buffer_size() > u64::from(i32::MAX as u32) {
            return Err(Error::InvalidArgument(format!(
                "buffer of {} frames is too large",
                self.buffer_size()
            )));
        }
        Ok(())
    }
}
