use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sample format, numbered as the kernel numbers them in the format mask.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PcmFormat {
    #[serde(rename = "S8")]
    S8,
    #[serde(rename = "U8")]
    U8,
    #[default]
    #[serde(rename = "S16_LE")]
    S16Le,
    #[serde(rename = "S16_BE")]
    S16Be,
    #[serde(rename = "U16_LE")]
    U16Le,
    #[serde(rename = "U16_BE")]
    U16Be,
    /// 24 bits in the low bytes of a 32-bit container.
    #[serde(rename = "S24_LE")]
    S24Le,
    #[serde(rename = "S24_BE")]
    S24Be,
    #[serde(rename = "U24_LE")]
    U24Le,
    #[serde(rename = "U24_BE")]
    U24Be,
    #[serde(rename = "S32_LE")]
    S32Le,
    #[serde(rename = "S32_BE")]
    S32Be,
    #[serde(rename = "U32_LE")]
    U32Le,
    #[serde(rename = "U32_BE")]
    U32Be,
    #[serde(rename = "FLOAT_LE")]
    FloatLe,
    #[serde(rename = "FLOAT_BE")]
    FloatBe,
    #[serde(rename = "FLOAT64_LE")]
    Float64Le,
    #[serde(rename = "FLOAT64_BE")]
    Float64Be,
    /// 24 bits packed in 3 bytes.
    #[serde(rename = "S24_3LE")]
    S24Le3,
    #[serde(rename = "S24_3BE")]
    S24Be3,
    #[serde(rename = "U24_3LE")]
    U24Le3,
    #[serde(rename = "U24_3BE")]
    U24Be3,
}

impl PcmFormat {
    pub const ALL: [PcmFormat; 22] = [
        Self::S8,
        Self::U8,
        Self::S16Le,
        Self::S16Be,
        Self::U16Le,
        Self::U16Be,
        Self::S24Le,
        Self::S24Be,
        Self::U24Le,
        Self::U24Be,
        Self::S32Le,
        Self::S32Be,
        Self::U32Le,
        Self::U32Be,
        Self::FloatLe,
        Self::FloatBe,
        Self::Float64Le,
        Self::Float64Be,
        Self::S24Le3,
        Self::S24Be3,
        Self::U24Le3,
        Self::U24Be3,
    ];

    pub fn to_alsa(self) -> u32 {
        match self {
            Self::S8 => 0,
            Self::U8 => 1,
            Self::S16Le => 2,
            Self::S16Be => 3,
            Self::U16Le => 4,
            Self::U16Be => 5,
            Self::S24Le => 6,
            Self::S24Be => 7,
            Self::U24Le => 8,
            Self::U24Be => 9,
            Self::S32Le => 10,
            Self::S32Be => 11,
            Self::U32Le => 12,
            Self::U32Be => 13,
            Self::FloatLe => 14,
            Self::FloatBe => 15,
            Self::Float64Le => 16,
            Self::Float64Be => 17,
            Self::S24Le3 => 32,
            Self::S24Be3 => 33,
            Self::U24Le3 => 34,
            Self::U24Be3 => 35,
        }
    }

    pub fn from_alsa(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.to_alsa() == value)
    }

    /// Bits each sample occupies in memory.
    pub fn physical_bits(self) -> u32 {
        match self {
            Self::S8 | Self::U8 => 8,
            Self::S16Le | Self::S16Be | Self::U16Le | Self::U16Be => 16,
            Self::S24Le3 | Self::S24Be3 | Self::U24Le3 | Self::U24Be3 => 24,
            Self::S24Le
            | Self::S24Be
            | Self::U24Le
            | Self::U24Be
            | Self::S32Le
            | Self::S32Be
            | Self::U32Le
            | Self::U32Be
            | Self::FloatLe
            | Self::FloatBe => 32,
            Self::Float64Le | Self::Float64Be => 64,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        (self.physical_bits() / 8) as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::S8 => "S8",
            Self::U8 => "U8",
            Self::S16Le => "S16_LE",
            Self::S16Be => "S16_BE",
            Self::U16Le => "U16_LE",
            Self::U16Be => "U16_BE",
            Self::S24Le => "S24_LE",
            Self::S24Be => "S24_BE",
            Self::U24Le => "U24_LE",
            Self::U24Be => "U24_BE",
            Self::S32Le => "S32_LE",
            Self::S32Be => "S32_BE",
            Self::U32Le => "U32_LE",
            Self::U32Be => "U32_BE",
            Self::FloatLe => "FLOAT_LE",
            Self::FloatBe => "FLOAT_BE",
            Self::Float64Le => "FLOAT64_LE",
            Self::Float64Be => "FLOAT64_BE",
            Self::S24Le3 => "S24_3LE",
            Self::S24Be3 => "S24_3BE",
            Self::U24Le3 => "U24_3LE",
            Self::U24Be3 => "U24_3BE",
        }
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PcmFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| crate::Error::InvalidArgument(format!("unknown sample format '{s}'")))
    }
}
