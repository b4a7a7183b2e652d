use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open mixer '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// The driver reports fewer controls than were already cached. Drivers
    /// only ever append controls, so the cache can no longer be trusted.
    #[error("driver removed controls: {cached} cached, {reported} reported")]
    ControlsRemoved { cached: u32, reported: u32 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn driver(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Driver {
            context: context.into(),
            source,
        }
    }

    /// Argument error whose text is capped like stream error text.
    pub fn invalid(text: impl AsRef<str>) -> Self {
        Self::InvalidArgument(pcmio::error::cap(text.as_ref(), pcmio::error::ERROR_MAX))
    }

    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Open { source, .. } | Self::Driver { source, .. } => source.raw_os_error(),
            Self::ControlsRemoved { .. } => Some(nix::libc::EIO),
            Self::InvalidArgument(_) => Some(nix::libc::EINVAL),
        }
    }
}
