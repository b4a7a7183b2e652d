use crate::ioctl::{
    SNDRV_CTL_EVENT_MASK_ADD, SNDRV_CTL_EVENT_MASK_INFO, SNDRV_CTL_EVENT_MASK_REMOVE,
    SNDRV_CTL_EVENT_MASK_TLV, SNDRV_CTL_EVENT_MASK_VALUE, SndCtlEvent,
};
use bitflags::bitflags;
use pcmio::pcm::ioctl::cstr_fixed;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const VALUE = SNDRV_CTL_EVENT_MASK_VALUE;
        const INFO = SNDRV_CTL_EVENT_MASK_INFO;
        const ADD = SNDRV_CTL_EVENT_MASK_ADD;
        const TLV = SNDRV_CTL_EVENT_MASK_TLV;
    }
}

/// Outcome of [`crate::Mixer::wait_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventWait {
    Ready,
    Timeout,
}

/// A change notification for one control element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtlEvent {
    pub numid: u32,
    pub name: String,
    pub index: u32,
    pub mask: EventMask,
    /// The element was removed; `mask` is empty in that case.
    pub removed: bool,
}

impl CtlEvent {
    pub fn from_raw(raw: &SndCtlEvent) -> Self {
        let removed = raw.mask == SNDRV_CTL_EVENT_MASK_REMOVE;
        Self {
            numid: raw.id.numid,
            name: cstr_fixed(&raw.id.name),
            index: raw.id.index,
            mask: if removed {
                EventMask::empty()
            } else {
                EventMask::from_bits_truncate(raw.mask)
            },
            removed,
        }
    }

    /// 0-based control id, as used by [`crate::Mixer::ctl`].
    pub fn ctl_id(&self) -> usize {
        self.numid.saturating_sub(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioctl::SndCtlElemId;

    #[test]
    fn value_event_decodes() {
        let raw = SndCtlEvent {
            mask: SNDRV_CTL_EVENT_MASK_VALUE | SNDRV_CTL_EVENT_MASK_INFO,
            id: SndCtlElemId::named(4, "Master Playback Volume", 0),
            ..SndCtlEvent::default()
        };
        let event = CtlEvent::from_raw(&raw);
        assert_eq!(event.ctl_id(), 3);
        assert_eq!(event.name, "Master Playback Volume");
        assert!(event.mask.contains(EventMask::VALUE | EventMask::INFO));
        assert!(!event.removed);
    }

    #[test]
    fn remove_mask_is_not_a_bit_set() {
        let raw = SndCtlEvent {
            mask: SNDRV_CTL_EVENT_MASK_REMOVE,
            id: SndCtlElemId::with_numid(2),
            ..SndCtlEvent::default()
        };
        let event = CtlEvent::from_raw(&raw);
        assert!(event.removed);
        assert!(event.mask.is_empty());
    }
}
