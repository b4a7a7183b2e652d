//! Kernel PCM ABI: the fixed binary records exchanged with the driver and the
//! ioctl request numbers that carry them.
//!
//! Layouts follow `<sound/asound.h>` for 64-bit Linux. Every record size and
//! the offsets the library depends on are checked at compile time, so a
//! layout drift fails the build instead of corrupting a driver call.

use nix::libc;
use std::mem::{offset_of, size_of};

pub const SNDRV_PCM_HW_PARAM_ACCESS: u32 = 0;
pub const SNDRV_PCM_HW_PARAM_FORMAT: u32 = 1;
pub const SNDRV_PCM_HW_PARAM_SUBFORMAT: u32 = 2;
pub const SNDRV_PCM_HW_PARAM_FIRST_MASK: u32 = SNDRV_PCM_HW_PARAM_ACCESS;
pub const SNDRV_PCM_HW_PARAM_LAST_MASK: u32 = SNDRV_PCM_HW_PARAM_SUBFORMAT;

pub const SNDRV_PCM_HW_PARAM_SAMPLE_BITS: u32 = 8;
pub const SNDRV_PCM_HW_PARAM_FRAME_BITS: u32 = 9;
pub const SNDRV_PCM_HW_PARAM_CHANNELS: u32 = 10;
pub const SNDRV_PCM_HW_PARAM_RATE: u32 = 11;
pub const SNDRV_PCM_HW_PARAM_PERIOD_TIME: u32 = 12;
pub const SNDRV_PCM_HW_PARAM_PERIOD_SIZE: u32 = 13;
pub const SNDRV_PCM_HW_PARAM_PERIOD_BYTES: u32 = 14;
pub const SNDRV_PCM_HW_PARAM_PERIODS: u32 = 15;
pub const SNDRV_PCM_HW_PARAM_BUFFER_TIME: u32 = 16;
pub const SNDRV_PCM_HW_PARAM_BUFFER_SIZE: u32 = 17;
pub const SNDRV_PCM_HW_PARAM_BUFFER_BYTES: u32 = 18;
pub const SNDRV_PCM_HW_PARAM_TICK_TIME: u32 = 19;
pub const SNDRV_PCM_HW_PARAM_FIRST_INTERVAL: u32 = SNDRV_PCM_HW_PARAM_SAMPLE_BITS;
pub const SNDRV_PCM_HW_PARAM_LAST_INTERVAL: u32 = SNDRV_PCM_HW_PARAM_TICK_TIME;

pub const SNDRV_MASK_MAX: u32 = 256;
const MASK_WORDS: usize = (SNDRV_MASK_MAX / 32) as usize;
const MASK_COUNT: usize = (SNDRV_PCM_HW_PARAM_LAST_MASK - SNDRV_PCM_HW_PARAM_FIRST_MASK + 1) as usize;
const INTERVAL_COUNT: usize =
    (SNDRV_PCM_HW_PARAM_LAST_INTERVAL - SNDRV_PCM_HW_PARAM_FIRST_INTERVAL + 1) as usize;

// hw_params.flags
pub const SNDRV_PCM_HW_PARAMS_NORESAMPLE: u32 = 1 << 0;
pub const SNDRV_PCM_HW_PARAMS_EXPORT_BUFFER: u32 = 1 << 1;
pub const SNDRV_PCM_HW_PARAMS_NO_PERIOD_WAKEUP: u32 = 1 << 2;

// Access
pub const SNDRV_PCM_ACCESS_MMAP_INTERLEAVED: u32 = 0;
pub const SNDRV_PCM_ACCESS_MMAP_NONINTERLEAVED: u32 = 1;
pub const SNDRV_PCM_ACCESS_MMAP_COMPLEX: u32 = 2;
pub const SNDRV_PCM_ACCESS_RW_INTERLEAVED: u32 = 3;
pub const SNDRV_PCM_ACCESS_RW_NONINTERLEAVED: u32 = 4;

pub const SNDRV_PCM_SUBFORMAT_STD: u32 = 0;

pub const SNDRV_PCM_TSTAMP_NONE: libc::c_int = 0;
pub const SNDRV_PCM_TSTAMP_ENABLE: libc::c_int = 1;
pub const SNDRV_PCM_TSTAMP_TYPE_GETTIMEOFDAY: libc::c_int = 0;
pub const SNDRV_PCM_TSTAMP_TYPE_MONOTONIC: libc::c_int = 1;

// sync_ptr.flags
pub const SNDRV_PCM_SYNC_PTR_HWSYNC: u32 = 1 << 0;
pub const SNDRV_PCM_SYNC_PTR_APPL: u32 = 1 << 1;
pub const SNDRV_PCM_SYNC_PTR_AVAIL_MIN: u32 = 1 << 2;

pub const SNDRV_PCM_MMAP_OFFSET_DATA: u64 = 0x0000_0000;
pub const SNDRV_PCM_MMAP_OFFSET_STATUS: u64 = 0x8000_0000;
pub const SNDRV_PCM_MMAP_OFFSET_CONTROL: u64 = 0x8100_0000;

pub const SNDRV_PCM_STREAM_PLAYBACK: libc::c_int = 0;
pub const SNDRV_PCM_STREAM_CAPTURE: libc::c_int = 1;

// snd_interval bitfield
pub const SND_INTERVAL_OPENMIN: u32 = 1 << 0;
pub const SND_INTERVAL_OPENMAX: u32 = 1 << 1;
pub const SND_INTERVAL_INTEGER: u32 = 1 << 2;
pub const SND_INTERVAL_EMPTY: u32 = 1 << 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndMask {
    pub bits: [u32; MASK_WORDS],
}

impl SndMask {
    pub const fn full() -> Self {
        Self {
            bits: [!0; MASK_WORDS],
        }
    }

    pub const fn empty() -> Self {
        Self {
            bits: [0; MASK_WORDS],
        }
    }

    pub fn test(&self, bit: u32) -> bool {
        bit < SNDRV_MASK_MAX && (self.bits[(bit >> 5) as usize] & (1 << (bit & 31))) != 0
    }

    pub fn set(&mut self, bit: u32) {
        if bit < SNDRV_MASK_MAX {
            self.bits[(bit >> 5) as usize] |= 1 << (bit & 31);
        }
    }

    /// Clears every bit and sets only `bit`.
    pub fn set_only(&mut self, bit: u32) {
        if bit >= SNDRV_MASK_MAX {
            return;
        }
        *self = Self::empty();
        self.set(bit);
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    pub fn intersect(&mut self, other: &SndMask) {
        for (word, o) in self.bits.iter_mut().zip(other.bits.iter()) {
            *word &= *o;
        }
    }

    pub fn first(&self) -> Option<u32> {
        self.iter().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..SNDRV_MASK_MAX).filter(move |bit| self.test(*bit))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndInterval {
    pub min: u32,
    pub max: u32,
    pub flags: u32,
}

impl SndInterval {
    pub const fn full() -> Self {
        Self {
            min: 0,
            max: !0,
            flags: 0,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.flags & SND_INTERVAL_INTEGER != 0
    }

    pub fn is_empty(&self) -> bool {
        self.flags & SND_INTERVAL_EMPTY != 0 || self.min > self.max
    }

    pub fn set_integer(&mut self, value: u32) {
        self.min = value;
        self.max = value;
        self.flags = (self.flags | SND_INTERVAL_INTEGER) & !(SND_INTERVAL_OPENMIN | SND_INTERVAL_OPENMAX);
    }

    /// Narrows to the overlap with `[min, max]`; never widens.
    pub fn clamp_to(&mut self, min: u32, max: u32) {
        if min > self.min {
            self.min = min;
            self.flags &= !SND_INTERVAL_OPENMIN;
        }
        if max < self.max {
            self.max = max;
            self.flags &= !SND_INTERVAL_OPENMAX;
        }
        if self.min > self.max {
            self.flags |= SND_INTERVAL_EMPTY;
        }
    }

    pub fn single(&self) -> Option<u32> {
        if !self.is_empty() && self.min == self.max {
            Some(self.min)
        } else {
            None
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndPcmHwParams {
    pub flags: u32,
    pub masks: [SndMask; MASK_COUNT],
    pub mres: [SndMask; 5],
    pub intervals: [SndInterval; INTERVAL_COUNT],
    pub ires: [SndInterval; 9],
    pub rmask: u32,
    pub cmask: u32,
    pub info: u32,
    pub msbits: u32,
    pub rate_num: u32,
    pub rate_den: u32,
    pub fifo_size: libc::c_ulong,
    pub reserved: [u8; 64],
}

impl SndPcmHwParams {
    pub fn zeroed() -> Self {
        Self {
            flags: 0,
            masks: [SndMask::empty(); MASK_COUNT],
            mres: [SndMask::empty(); 5],
            intervals: [SndInterval {
                min: 0,
                max: 0,
                flags: 0,
            }; INTERVAL_COUNT],
            ires: [SndInterval {
                min: 0,
                max: 0,
                flags: 0,
            }; 9],
            rmask: 0,
            cmask: 0,
            info: 0,
            msbits: 0,
            rate_num: 0,
            rate_den: 0,
            fifo_size: 0,
            reserved: [0; 64],
        }
    }

    pub fn mask(&self, param: u32) -> Option<&SndMask> {
        if param > SNDRV_PCM_HW_PARAM_LAST_MASK {
            return None;
        }
        self.masks.get((param - SNDRV_PCM_HW_PARAM_FIRST_MASK) as usize)
    }

    pub fn mask_mut(&mut self, param: u32) -> Option<&mut SndMask> {
        if param > SNDRV_PCM_HW_PARAM_LAST_MASK {
            return None;
        }
        self.masks
            .get_mut((param - SNDRV_PCM_HW_PARAM_FIRST_MASK) as usize)
    }

    pub fn interval(&self, param: u32) -> Option<&SndInterval> {
        if !(SNDRV_PCM_HW_PARAM_FIRST_INTERVAL..=SNDRV_PCM_HW_PARAM_LAST_INTERVAL).contains(&param) {
            return None;
        }
        self.intervals
            .get((param - SNDRV_PCM_HW_PARAM_FIRST_INTERVAL) as usize)
    }

    pub fn interval_mut(&mut self, param: u32) -> Option<&mut SndInterval> {
        if !(SNDRV_PCM_HW_PARAM_FIRST_INTERVAL..=SNDRV_PCM_HW_PARAM_LAST_INTERVAL).contains(&param) {
            return None;
        }
        self.intervals
            .get_mut((param - SNDRV_PCM_HW_PARAM_FIRST_INTERVAL) as usize)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndPcmSwParams {
    pub tstamp_mode: libc::c_int,
    pub period_step: u32,
    pub sleep_min: u32,
    pub avail_min: libc::c_ulong,
    pub xfer_align: libc::c_ulong,
    pub start_threshold: libc::c_ulong,
    pub stop_threshold: libc::c_ulong,
    pub silence_threshold: libc::c_ulong,
    pub silence_size: libc::c_ulong,
    pub boundary: libc::c_ulong,
    pub proto: u32,
    pub tstamp_type: u32,
    pub reserved: [u8; 56],
}

impl Default for SndPcmSwParams {
    fn default() -> Self {
        Self {
            tstamp_mode: SNDRV_PCM_TSTAMP_NONE,
            period_step: 0,
            sleep_min: 0,
            avail_min: 0,
            xfer_align: 0,
            start_threshold: 0,
            stop_threshold: 0,
            silence_threshold: 0,
            silence_size: 0,
            boundary: 0,
            proto: 0,
            tstamp_type: 0,
            reserved: [0; 56],
        }
    }
}

/// `struct timespec` as the kernel writes it into status records.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KernelTimespec {
    pub tv_sec: libc::time_t,
    pub tv_nsec: libc::c_long,
}

impl KernelTimespec {
    pub fn is_zero(&self) -> bool {
        self.tv_sec == 0 && self.tv_nsec == 0
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SndPcmMmapStatus {
    pub state: libc::c_int,
    pub pad1: libc::c_int,
    pub hw_ptr: libc::c_ulong,
    pub tstamp: KernelTimespec,
    pub suspended_state: libc::c_int,
    pub audio_tstamp: KernelTimespec,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SndPcmMmapControl {
    pub appl_ptr: libc::c_ulong,
    pub avail_min: libc::c_ulong,
}

/// `snd_pcm_sync_ptr`: both kernel unions are 64 bytes wide, the tails are
/// spelled out as padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndPcmSyncPtr {
    pub flags: u32,
    pub status: SndPcmMmapStatus,
    pub status_pad: [u8; 64 - size_of::<SndPcmMmapStatus>()],
    pub control: SndPcmMmapControl,
    pub control_pad: [u8; 64 - size_of::<SndPcmMmapControl>()],
}

impl Default for SndPcmSyncPtr {
    fn default() -> Self {
        Self {
            flags: 0,
            status: SndPcmMmapStatus::default(),
            status_pad: [0; 64 - size_of::<SndPcmMmapStatus>()],
            control: SndPcmMmapControl::default(),
            control_pad: [0; 64 - size_of::<SndPcmMmapControl>()],
        }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct SndXferi {
    pub result: libc::c_long,
    pub buf: *mut libc::c_void,
    pub frames: libc::c_ulong,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndPcmInfo {
    pub device: u32,
    pub subdevice: u32,
    pub stream: libc::c_int,
    pub card: libc::c_int,
    pub id: [u8; 64],
    pub name: [u8; 80],
    pub subname: [u8; 32],
    pub dev_class: libc::c_int,
    pub dev_subclass: libc::c_int,
    pub subdevices_count: u32,
    pub subdevices_avail: u32,
    pub sync: [u8; 16],
    pub reserved: [u8; 64],
}

impl Default for SndPcmInfo {
    fn default() -> Self {
        Self {
            device: 0,
            subdevice: 0,
            stream: 0,
            card: 0,
            id: [0; 64],
            name: [0; 80],
            subname: [0; 32],
            dev_class: 0,
            dev_subclass: 0,
            subdevices_count: 0,
            subdevices_avail: 0,
            sync: [0; 16],
            reserved: [0; 64],
        }
    }
}

/// Reads a NUL-padded fixed-size name field.
pub fn cstr_fixed(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(size_of::<SndMask>() == 32);
    assert!(size_of::<SndInterval>() == 12);
    assert!(size_of::<SndPcmHwParams>() == 608);
    assert!(offset_of!(SndPcmHwParams, masks) == 4);
    assert!(offset_of!(SndPcmHwParams, intervals) == 260);
    assert!(offset_of!(SndPcmHwParams, rmask) == 512);
    assert!(offset_of!(SndPcmHwParams, fifo_size) == 536);
    assert!(size_of::<SndPcmSwParams>() == 136);
    assert!(offset_of!(SndPcmSwParams, avail_min) == 16);
    assert!(offset_of!(SndPcmSwParams, boundary) == 64);
    assert!(offset_of!(SndPcmSwParams, proto) == 72);
    assert!(size_of::<SndPcmMmapStatus>() == 56);
    assert!(offset_of!(SndPcmMmapStatus, hw_ptr) == 8);
    assert!(offset_of!(SndPcmMmapStatus, tstamp) == 16);
    assert!(offset_of!(SndPcmMmapStatus, audio_tstamp) == 40);
    assert!(size_of::<SndPcmMmapControl>() == 16);
    assert!(size_of::<SndPcmSyncPtr>() == 136);
    assert!(offset_of!(SndPcmSyncPtr, status) == 8);
    assert!(offset_of!(SndPcmSyncPtr, control) == 72);
    assert!(size_of::<SndXferi>() == 24);
    assert!(size_of::<SndPcmInfo>() == 288);
    assert!(offset_of!(SndPcmInfo, sync) == 208);
};

const SNDRV_PCM_IOCTL_MAGIC: u8 = b'A';
const SNDRV_PCM_IOCTL_INFO: u8 = 0x01;
const SNDRV_PCM_IOCTL_TTSTAMP: u8 = 0x03;
const SNDRV_PCM_IOCTL_HW_REFINE: u8 = 0x10;
const SNDRV_PCM_IOCTL_HW_PARAMS: u8 = 0x11;
const SNDRV_PCM_IOCTL_SW_PARAMS: u8 = 0x13;
const SNDRV_PCM_IOCTL_DELAY: u8 = 0x21;
const SNDRV_PCM_IOCTL_SYNC_PTR: u8 = 0x23;
const SNDRV_PCM_IOCTL_PREPARE: u8 = 0x40;
const SNDRV_PCM_IOCTL_START: u8 = 0x42;
const SNDRV_PCM_IOCTL_DROP: u8 = 0x43;
const SNDRV_PCM_IOCTL_DRAIN: u8 = 0x44;
const SNDRV_PCM_IOCTL_WRITEI_FRAMES: u8 = 0x50;
const SNDRV_PCM_IOCTL_READI_FRAMES: u8 = 0x51;
const SNDRV_PCM_IOCTL_LINK: u8 = 0x60;
const SNDRV_PCM_IOCTL_UNLINK: u8 = 0x61;

nix::ioctl_read!(
    snd_pcm_info,
    SNDRV_PCM_IOCTL_MAGIC,
    SNDRV_PCM_IOCTL_INFO,
    SndPcmInfo
);
nix::ioctl_write_ptr!(
    snd_pcm_ttstamp,
    SNDRV_PCM_IOCTL_MAGIC,
    SNDRV_PCM_IOCTL_TTSTAMP,
    libc::c_int
);
nix::ioctl_readwrite!(
    snd_pcm_hw_refine,
    SNDRV_PCM_IOCTL_MAGIC,
    SNDRV_PCM_IOCTL_HW_REFINE,
    SndPcmHwParams
);
nix::ioctl_readwrite!(
    snd_pcm_hw_params,
    SNDRV_PCM_IOCTL_MAGIC,
    SNDRV_PCM_IOCTL_HW_PARAMS,
    SndPcmHwParams
);
nix::ioctl_readwrite!(
    snd_pcm_sw_params,
    SNDRV_PCM_IOCTL_MAGIC,
    SNDRV_PCM_IOCTL_SW_PARAMS,
    SndPcmSwParams
);
nix::ioctl_read!(
    snd_pcm_delay,
    SNDRV_PCM_IOCTL_MAGIC,
    SNDRV_PCM_IOCTL_DELAY,
    libc::c_long
);
nix::ioctl_readwrite!(
    snd_pcm_sync_ptr,
    SNDRV_PCM_IOCTL_MAGIC,
    SNDRV_PCM_IOCTL_SYNC_PTR,
    SndPcmSyncPtr
);
nix::ioctl_none!(snd_pcm_prepare, SNDRV_PCM_IOCTL_MAGIC, SNDRV_PCM_IOCTL_PREPARE);
nix::ioctl_none!(snd_pcm_start, SNDRV_PCM_IOCTL_MAGIC, SNDRV_PCM_IOCTL_START);
nix::ioctl_none!(snd_pcm_drop, SNDRV_PCM_IOCTL_MAGIC, SNDRV_PCM_IOCTL_DROP);
nix::ioctl_none!(snd_pcm_drain, SNDRV_PCM_IOCTL_MAGIC, SNDRV_PCM_IOCTL_DRAIN);
// WRITEI is declared _IOW but the kernel stores the transferred count in
// `result`, so the record has to be passed mutable.
nix::ioctl_readwrite_bad!(
    snd_pcm_writei_frames,
    nix::request_code_write!(
        SNDRV_PCM_IOCTL_MAGIC,
        SNDRV_PCM_IOCTL_WRITEI_FRAMES,
        size_of::<SndXferi>()
    ),
    SndXferi
);
nix::ioctl_read!(
    snd_pcm_readi_frames,
    SNDRV_PCM_IOCTL_MAGIC,
    SNDRV_PCM_IOCTL_READI_FRAMES,
    SndXferi
);
nix::ioctl_write_int_bad!(
    snd_pcm_link,
    nix::request_code_write!(
        SNDRV_PCM_IOCTL_MAGIC,
        SNDRV_PCM_IOCTL_LINK,
        size_of::<libc::c_int>()
    )
);
nix::ioctl_none!(snd_pcm_unlink, SNDRV_PCM_IOCTL_MAGIC, SNDRV_PCM_IOCTL_UNLINK);
