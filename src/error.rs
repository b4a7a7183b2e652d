use crate::pcm::params::HwParamSet;

/// Longest error text kept on a stream handle.
pub const ERROR_MAX: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Config {
        context: String,
        #[source]
        source: std::io::Error,
        limits: Option<Box<HwParamSet>>,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("pcm not ready: {0}")]
    NotReady(String),
    #[error("{context}: broken pipe")]
    Xrun { context: String },
    #[error("hw pointer fault: hw_ptr {hw_ptr} appl_ptr {appl_ptr}")]
    PointerFault { hw_ptr: u64, appl_ptr: u64 },
    #[error("no timestamp available yet")]
    NoTimestamp,
    #[error("operation would block after {transferred} frames")]
    WouldBlock { transferred: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn driver(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Driver {
            context: context.into(),
            source,
        }
    }

    /// Underlying system error code, if this error came from the driver.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Driver { source, .. } | Self::Config { source, .. } => source.raw_os_error(),
            Self::Xrun { .. } => Some(nix::libc::EPIPE),
            Self::WouldBlock { .. } => Some(nix::libc::EAGAIN),
            Self::InvalidArgument(_) => Some(nix::libc::EINVAL),
            Self::NotReady(_) => Some(nix::libc::EBADFD),
            Self::PointerFault { .. } => Some(nix::libc::EFAULT),
            Self::NoTimestamp => Some(nix::libc::ENODATA),
        }
    }

    /// Driver capability set attached to a rejected configuration.
    pub fn limits(&self) -> Option<&HwParamSet> {
        match self {
            Self::Config { limits, .. } => limits.as_deref(),
            _ => None,
        }
    }
}

/// Truncates `text` to at most `max` bytes without splitting a character.
pub fn cap(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_reads_like_oops() {
        let err = Error::driver(
            "cannot prepare channel",
            std::io::Error::from_raw_os_error(nix::libc::EIO),
        );
        let text = err.to_string();
        assert!(text.starts_with("cannot prepare channel: "));
        assert_eq!(err.errno(), Some(nix::libc::EIO));
    }

    #[test]
    fn cap_respects_char_boundaries() {
        assert_eq!(cap("short", ERROR_MAX), "short");
        let long = "x".repeat(300);
        assert_eq!(cap(&long, ERROR_MAX).len(), ERROR_MAX);
        // 'é' is two bytes; cutting at 3 would split it.
        assert_eq!(cap("aaé", 3), "aa");
    }

    #[test]
    fn synthetic_errors_map_to_errno() {
        assert_eq!(
            Error::Xrun {
                context: "write".into()
            }
            .errno(),
            Some(nix::libc::EPIPE)
        );
        assert_eq!(
            Error::WouldBlock { transferred: 3 }.errno(),
            Some(nix::libc::EAGAIN)
        );
        assert!(Error::NoTimestamp.limits().is_none());
    }
}
