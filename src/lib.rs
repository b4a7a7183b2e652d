//! Userspace PCM I/O over the ALSA kernel interface.
//!
//! Streams are opened with [`Pcm::open`], which negotiates hardware and
//! software parameters, sets up pointer synchronisation with the driver and
//! hands back a handle for `writei`/`readi` or mapped transfers. Capability
//! probing without a stream lives in [`device`].

pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod pcm;

pub use error::{Error, Result};
pub use format::PcmFormat;
pub use pcm::constraints::{HwConstraints, Range};
pub use pcm::driver::{HwPcm, PcmDriver, SharedRegion};
pub use pcm::options::{Direction, PcmFlags, StreamConfig};
pub use pcm::params::{HwParamSet, PcmParam};
pub use pcm::{MmapRegion, Pcm, PcmState};
