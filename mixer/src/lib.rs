//! Mixer control access for ALSA cards.
//!
//! A [`Mixer`] caches the card's control list and the type info of every
//! control. Values go through [`MixerCtl`] handles obtained from the mixer;
//! change notifications are read with [`Mixer::wait_event`] and
//! [`Mixer::read_event`], typically on a second `Mixer` owned by a listener
//! thread.

pub mod ctl;
pub mod driver;
pub mod error;
pub mod event;
pub mod ioctl;
mod mixer;

pub use ctl::{Control, CtlType, MixerCtl};
pub use driver::{ControlDriver, HwControl};
pub use error::{Error, Result};
pub use event::{CtlEvent, EventMask, EventWait};
pub use mixer::Mixer;
