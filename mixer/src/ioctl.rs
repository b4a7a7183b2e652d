//! Kernel control ABI (`controlC<card>` nodes): card identity, element
//! list/info/value records, TLV transfers and change events.
//!
//! Records follow `<sound/asound.h>` for 64-bit Linux. The unions the kernel
//! uses for element info and values are carried as aligned byte areas with
//! typed accessors; their sizes and the offsets around them are asserted at
//! compile time.

use byteorder::{ByteOrder, NativeEndian};
use nix::libc;
use pcmio::pcm::ioctl::KernelTimespec;
use std::mem::{offset_of, size_of};

pub const SNDRV_CTL_ELEM_TYPE_NONE: libc::c_int = 0;
pub const SNDRV_CTL_ELEM_TYPE_BOOLEAN: libc::c_int = 1;
pub const SNDRV_CTL_ELEM_TYPE_INTEGER: libc::c_int = 2;
pub const SNDRV_CTL_ELEM_TYPE_ENUMERATED: libc::c_int = 3;
pub const SNDRV_CTL_ELEM_TYPE_BYTES: libc::c_int = 4;
pub const SNDRV_CTL_ELEM_TYPE_IEC958: libc::c_int = 5;
pub const SNDRV_CTL_ELEM_TYPE_INTEGER64: libc::c_int = 6;

pub const SNDRV_CTL_ELEM_IFACE_MIXER: libc::c_int = 2;

pub const SNDRV_CTL_ELEM_ACCESS_READ: u32 = 1 << 0;
pub const SNDRV_CTL_ELEM_ACCESS_WRITE: u32 = 1 << 1;
pub const SNDRV_CTL_ELEM_ACCESS_READWRITE: u32 =
    SNDRV_CTL_ELEM_ACCESS_READ | SNDRV_CTL_ELEM_ACCESS_WRITE;
pub const SNDRV_CTL_ELEM_ACCESS_TLV_READ: u32 = 1 << 4;
pub const SNDRV_CTL_ELEM_ACCESS_TLV_WRITE: u32 = 1 << 5;
pub const SNDRV_CTL_ELEM_ACCESS_TLV_READWRITE: u32 =
    SNDRV_CTL_ELEM_ACCESS_TLV_READ | SNDRV_CTL_ELEM_ACCESS_TLV_WRITE;

pub const SNDRV_CTL_EVENT_ELEM: libc::c_int = 0;
pub const SNDRV_CTL_EVENT_MASK_VALUE: u32 = 1 << 0;
pub const SNDRV_CTL_EVENT_MASK_INFO: u32 = 1 << 1;
pub const SNDRV_CTL_EVENT_MASK_ADD: u32 = 1 << 2;
pub const SNDRV_CTL_EVENT_MASK_TLV: u32 = 1 << 3;
pub const SNDRV_CTL_EVENT_MASK_REMOVE: u32 = !0;

pub const SNDRV_CTL_ELEM_ID_NAME_MAXLEN: usize = 44;
pub const ENUM_NAME_MAXLEN: usize = 64;

/// `struct snd_ctl_tlv` header: numid and payload length in bytes.
pub const TLV_HEADER_SIZE: usize = 2 * size_of::<u32>();

// Capacity of each view of the value union.
pub const MAX_INTEGER_VALUES: usize = 128;
pub const MAX_INTEGER64_VALUES: usize = 64;
pub const MAX_ENUM_VALUES: usize = 128;
pub const MAX_BYTE_VALUES: usize = 512;

/// Raw storage for a kernel union, aligned like the `long` members inside.
#[repr(C, align(8))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ValueArea<const N: usize> {
    pub bytes: [u8; N],
}

impl<const N: usize> ValueArea<N> {
    pub const fn zeroed() -> Self {
        Self { bytes: [0; N] }
    }

    pub fn u32_at(&self, offset: usize) -> u32 {
        NativeEndian::read_u32(&self.bytes[offset..offset + 4])
    }

    pub fn set_u32_at(&mut self, offset: usize, value: u32) {
        NativeEndian::write_u32(&mut self.bytes[offset..offset + 4], value);
    }

    pub fn i64_at(&self, offset: usize) -> i64 {
        NativeEndian::read_i64(&self.bytes[offset..offset + 8])
    }

    pub fn set_i64_at(&mut self, offset: usize, value: i64) {
        NativeEndian::write_i64(&mut self.bytes[offset..offset + 8], value);
    }

    pub fn u64_at(&self, offset: usize) -> u64 {
        NativeEndian::read_u64(&self.bytes[offset..offset + 8])
    }
}

impl<const N: usize> Default for ValueArea<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const N: usize> std::fmt::Debug for ValueArea<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ValueArea<{N}>")
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndCtlCardInfo {
    pub card: libc::c_int,
    pub pad: libc::c_int,
    pub id: [u8; 16],
    pub driver: [u8; 16],
    pub name: [u8; 32],
    pub longname: [u8; 80],
    pub reserved_: [u8; 16],
    pub mixername: [u8; 80],
    pub components: [u8; 128],
}

impl Default for SndCtlCardInfo {
    fn default() -> Self {
        Self {
            card: 0,
            pad: 0,
            id: [0; 16],
            driver: [0; 16],
            name: [0; 32],
            longname: [0; 80],
            reserved_: [0; 16],
            mixername: [0; 80],
            components: [0; 128],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndCtlElemId {
    pub numid: u32,
    pub iface: libc::c_int,
    pub device: u32,
    pub subdevice: u32,
    pub name: [u8; SNDRV_CTL_ELEM_ID_NAME_MAXLEN],
    pub index: u32,
}

impl SndCtlElemId {
    pub fn with_numid(numid: u32) -> Self {
        Self {
            numid,
            ..Self::default()
        }
    }

    /// Builds an id carrying `name`, truncated to the field width.
    pub fn named(numid: u32, name: &str, index: u32) -> Self {
        let mut id = Self::with_numid(numid);
        id.iface = SNDRV_CTL_ELEM_IFACE_MIXER;
        id.index = index;
        let len = name.len().min(SNDRV_CTL_ELEM_ID_NAME_MAXLEN - 1);
        id.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        id
    }
}

impl Default for SndCtlElemId {
    fn default() -> Self {
        Self {
            numid: 0,
            iface: 0,
            device: 0,
            subdevice: 0,
            name: [0; SNDRV_CTL_ELEM_ID_NAME_MAXLEN],
            index: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct SndCtlElemList {
    pub offset: u32,
    pub space: u32,
    pub used: u32,
    pub count: u32,
    pub pids: *mut SndCtlElemId,
    pub reserved: [u8; 50],
}

impl Default for SndCtlElemList {
    fn default() -> Self {
        Self {
            offset: 0,
            space: 0,
            used: 0,
            count: 0,
            pids: std::ptr::null_mut(),
            reserved: [0; 50],
        }
    }
}

// Offsets inside SndCtlElemInfo::value.
const INFO_INTEGER_MIN: usize = 0;
const INFO_INTEGER_MAX: usize = 8;
const INFO_INTEGER_STEP: usize = 16;
const INFO_ENUM_ITEMS: usize = 0;
const INFO_ENUM_ITEM: usize = 4;
const INFO_ENUM_NAME: usize = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndCtlElemInfo {
    pub id: SndCtlElemId,
    pub type_: libc::c_int,
    pub access: u32,
    pub count: u32,
    pub owner: libc::pid_t,
    pub value: ValueArea<128>,
    pub dimen: [u16; 4],
    pub reserved: [u8; 56],
}

impl SndCtlElemInfo {
    pub fn for_numid(numid: u32) -> Self {
        Self {
            id: SndCtlElemId::with_numid(numid),
            ..Self::default()
        }
    }

    /// `value.integer` (and `value.integer64`, which shares the layout on
    /// 64-bit targets).
    pub fn integer_min(&self) -> i64 {
        self.value.i64_at(INFO_INTEGER_MIN)
    }

    pub fn integer_max(&self) -> i64 {
        self.value.i64_at(INFO_INTEGER_MAX)
    }

    pub fn integer_step(&self) -> i64 {
        self.value.i64_at(INFO_INTEGER_STEP)
    }

    pub fn set_integer_range(&mut self, min: i64, max: i64, step: i64) {
        self.value.set_i64_at(INFO_INTEGER_MIN, min);
        self.value.set_i64_at(INFO_INTEGER_MAX, max);
        self.value.set_i64_at(INFO_INTEGER_STEP, step);
    }

    pub fn enum_items(&self) -> u32 {
        self.value.u32_at(INFO_ENUM_ITEMS)
    }

    pub fn set_enum_items(&mut self, items: u32) {
        self.value.set_u32_at(INFO_ENUM_ITEMS, items);
    }

    pub fn enum_item(&self) -> u32 {
        self.value.u32_at(INFO_ENUM_ITEM)
    }

    /// Selects which item name the next ELEM_INFO call fills in.
    pub fn set_enum_item(&mut self, item: u32) {
        self.value.set_u32_at(INFO_ENUM_ITEM, item);
    }

    pub fn enum_name(&self) -> String {
        pcmio::pcm::ioctl::cstr_fixed(
            &self.value.bytes[INFO_ENUM_NAME..INFO_ENUM_NAME + ENUM_NAME_MAXLEN],
        )
    }

    pub fn set_enum_name(&mut self, name: &str) {
        let area = &mut self.value.bytes[INFO_ENUM_NAME..INFO_ENUM_NAME + ENUM_NAME_MAXLEN];
        area.fill(0);
        let len = name.len().min(ENUM_NAME_MAXLEN - 1);
        area[..len].copy_from_slice(&name.as_bytes()[..len]);
    }
}

impl Default for SndCtlElemInfo {
    fn default() -> Self {
        Self {
            id: SndCtlElemId::default(),
            type_: SNDRV_CTL_ELEM_TYPE_NONE,
            access: 0,
            count: 0,
            owner: 0,
            value: ValueArea::zeroed(),
            dimen: [0; 4],
            reserved: [0; 56],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndCtlElemValue {
    pub id: SndCtlElemId,
    pub indirect: u32,
    pub value: ValueArea<1024>,
    pub tstamp: KernelTimespec,
    pub reserved: [u8; 112],
}

impl SndCtlElemValue {
    pub fn for_numid(numid: u32) -> Self {
        Self {
            id: SndCtlElemId::with_numid(numid),
            ..Self::default()
        }
    }

    /// `value.integer.value[index]` (`long`).
    pub fn integer(&self, index: usize) -> i64 {
        self.value.i64_at(index * 8)
    }

    pub fn set_integer(&mut self, index: usize, value: i64) {
        self.value.set_i64_at(index * 8, value);
    }

    /// `value.integer64.value[index]`.
    pub fn integer64(&self, index: usize) -> i64 {
        self.value.i64_at(index * 8)
    }

    pub fn set_integer64(&mut self, index: usize, value: i64) {
        self.value.set_i64_at(index * 8, value);
    }

    /// `value.enumerated.item[index]`.
    pub fn enum_item(&self, index: usize) -> u32 {
        self.value.u32_at(index * 4)
    }

    pub fn set_enum_item(&mut self, index: usize, item: u32) {
        self.value.set_u32_at(index * 4, item);
    }

    /// `value.bytes.data`.
    pub fn bytes(&self) -> &[u8] {
        &self.value.bytes[..MAX_BYTE_VALUES]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.value.bytes[..MAX_BYTE_VALUES]
    }
}

impl Default for SndCtlElemValue {
    fn default() -> Self {
        Self {
            id: SndCtlElemId::default(),
            indirect: 0,
            value: ValueArea::zeroed(),
            tstamp: KernelTimespec::default(),
            reserved: [0; 112],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SndCtlEvent {
    pub type_: libc::c_int,
    pub mask: u32,
    pub id: SndCtlElemId,
}

impl Default for SndCtlEvent {
    fn default() -> Self {
        Self {
            type_: SNDRV_CTL_EVENT_ELEM,
            mask: 0,
            id: SndCtlElemId::default(),
        }
    }
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(size_of::<SndCtlCardInfo>() == 376);
    assert!(offset_of!(SndCtlCardInfo, name) == 40);
    assert!(offset_of!(SndCtlCardInfo, mixername) == 168);
    assert!(size_of::<SndCtlElemId>() == 64);
    assert!(offset_of!(SndCtlElemId, name) == 16);
    assert!(offset_of!(SndCtlElemId, index) == 60);
    assert!(size_of::<SndCtlElemList>() == 80);
    assert!(offset_of!(SndCtlElemList, pids) == 16);
    assert!(size_of::<SndCtlElemInfo>() == 272);
    assert!(offset_of!(SndCtlElemInfo, type_) == 64);
    assert!(offset_of!(SndCtlElemInfo, count) == 72);
    assert!(offset_of!(SndCtlElemInfo, value) == 80);
    assert!(offset_of!(SndCtlElemInfo, dimen) == 208);
    assert!(size_of::<SndCtlElemValue>() == 1224);
    assert!(offset_of!(SndCtlElemValue, value) == 72);
    assert!(offset_of!(SndCtlElemValue, tstamp) == 1096);
    assert!(size_of::<SndCtlEvent>() == 72);
    assert!(offset_of!(SndCtlEvent, id) == 8);
};

const SNDRV_CTL_IOCTL_MAGIC: u8 = b'U';
const SNDRV_CTL_IOCTL_CARD_INFO: u8 = 0x01;
const SNDRV_CTL_IOCTL_ELEM_LIST: u8 = 0x10;
const SNDRV_CTL_IOCTL_ELEM_INFO: u8 = 0x11;
const SNDRV_CTL_IOCTL_ELEM_READ: u8 = 0x12;
const SNDRV_CTL_IOCTL_ELEM_WRITE: u8 = 0x13;
const SNDRV_CTL_IOCTL_SUBSCRIBE_EVENTS: u8 = 0x16;
const SNDRV_CTL_IOCTL_TLV_READ: u8 = 0x1a;
const SNDRV_CTL_IOCTL_TLV_WRITE: u8 = 0x1b;

nix::ioctl_read!(
    snd_ctl_card_info,
    SNDRV_CTL_IOCTL_MAGIC,
    SNDRV_CTL_IOCTL_CARD_INFO,
    SndCtlCardInfo
);
nix::ioctl_readwrite!(
    snd_ctl_elem_list,
    SNDRV_CTL_IOCTL_MAGIC,
    SNDRV_CTL_IOCTL_ELEM_LIST,
    SndCtlElemList
);
nix::ioctl_readwrite!(
    snd_ctl_elem_info,
    SNDRV_CTL_IOCTL_MAGIC,
    SNDRV_CTL_IOCTL_ELEM_INFO,
    SndCtlElemInfo
);
nix::ioctl_readwrite!(
    snd_ctl_elem_read,
    SNDRV_CTL_IOCTL_MAGIC,
    SNDRV_CTL_IOCTL_ELEM_READ,
    SndCtlElemValue
);
nix::ioctl_readwrite!(
    snd_ctl_elem_write,
    SNDRV_CTL_IOCTL_MAGIC,
    SNDRV_CTL_IOCTL_ELEM_WRITE,
    SndCtlElemValue
);
nix::ioctl_readwrite!(
    snd_ctl_subscribe_events,
    SNDRV_CTL_IOCTL_MAGIC,
    SNDRV_CTL_IOCTL_SUBSCRIBE_EVENTS,
    libc::c_int
);
// TLV records end in a flexible array, so the request encodes only the
// header size and the caller passes the whole [numid, length, payload..]
// buffer.
nix::ioctl_readwrite_bad!(
    snd_ctl_tlv_read,
    nix::request_code_readwrite!(
        SNDRV_CTL_IOCTL_MAGIC,
        SNDRV_CTL_IOCTL_TLV_READ,
        TLV_HEADER_SIZE
    ),
    u32
);
nix::ioctl_readwrite_bad!(
    snd_ctl_tlv_write,
    nix::request_code_readwrite!(
        SNDRV_CTL_IOCTL_MAGIC,
        SNDRV_CTL_IOCTL_TLV_WRITE,
        TLV_HEADER_SIZE
    ),
    u32
);

/// Packs a TLV transfer buffer: header words followed by `payload_len`
/// bytes of payload rounded up to whole words.
pub fn tlv_buffer(numid: u32, payload_len: usize) -> Vec<u32> {
    let words = payload_len.div_ceil(size_of::<u32>());
    let mut buf = vec![0_u32; 2 + words];
    buf[0] = numid;
    buf[1] = payload_len as u32;
    buf
}

/// Payload bytes of a TLV buffer built by [`tlv_buffer`].
pub fn tlv_payload(buf: &[u32]) -> Vec<u8> {
    let len = buf.get(1).copied().unwrap_or(0) as usize;
    buf.iter()
        .skip(2)
        .flat_map(|word| word.to_ne_bytes())
        .take(len)
        .collect()
}

pub fn tlv_fill(buf: &mut [u32], payload: &[u8]) {
    for (word, chunk) in buf.iter_mut().skip(2).zip(payload.chunks(size_of::<u32>())) {
        let mut bytes = [0_u8; 4];
        bytes[..chunk.len()].copy_from_slice(chunk);
        *word = u32::from_ne_bytes(bytes);
    }
}
