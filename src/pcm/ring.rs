//! Application/hardware pointer bookkeeping shared with the driver.
//!
//! The kernel either exposes its status and control records as mappable
//! pages or, where that is not possible, copies them in and out through
//! SYNC_PTR. Both paths are hidden behind [`RingBuffer`], chosen once when
//! the stream is set up.

use super::driver::{PcmDriver, SharedRegion};
use super::ioctl::{
    KernelTimespec, SNDRV_PCM_MMAP_OFFSET_CONTROL, SNDRV_PCM_MMAP_OFFSET_STATUS,
    SndPcmMmapControl, SndPcmMmapStatus, SndPcmSyncPtr,
};
use nix::libc;
use std::ptr::{self, NonNull};

pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

#[derive(Debug)]
pub struct MappedPages {
    status: NonNull<SndPcmMmapStatus>,
    control: NonNull<SndPcmMmapControl>,
    // Keep the mappings alive for as long as the pointers above are used.
    _status_region: SharedRegion,
    _control_region: SharedRegion,
}

impl MappedPages {
    fn map(driver: &mut dyn PcmDriver) -> std::io::Result<Self> {
        let page = page_size();
        let status_region = driver.map_region(SNDRV_PCM_MMAP_OFFSET_STATUS, page, false)?;
        // On failure the status page is unmapped when `status_region` drops.
        let control_region = driver.map_region(SNDRV_PCM_MMAP_OFFSET_CONTROL, page, true)?;
        let too_small = || std::io::Error::from_raw_os_error(libc::ENOMEM);
        let status = status_region.typed::<SndPcmMmapStatus>().ok_or_else(too_small)?;
        let control = control_region
            .typed::<SndPcmMmapControl>()
            .ok_or_else(too_small)?;
        Ok(Self {
            status,
            control,
            _status_region: status_region,
            _control_region: control_region,
        })
    }
}

unsafe impl Send for MappedPages {}

#[derive(Debug)]
pub enum RingBuffer {
    Mapped(MappedPages),
    SyncPtr(Box<SndPcmSyncPtr>),
}

impl RingBuffer {
    /// Maps the status and control pages, or falls back to SYNC_PTR when
    /// either mapping fails or `force_sync_ptr` is set. The control record
    /// starts out with `avail_min` as negotiated in the sw params.
    pub fn establish(
        driver: &mut dyn PcmDriver,
        force_sync_ptr: bool,
        avail_min: u64,
    ) -> std::io::Result<Self> {
        if !force_sync_ptr {
            match MappedPages::map(driver) {
                Ok(pages) => {
                    let mut ring = Self::Mapped(pages);
                    ring.set_avail_min(avail_min);
                    return Ok(ring);
                }
                Err(e) => {
                    tracing::debug!("status/control mmap unavailable ({e}), using SYNC_PTR");
                }
            }
        }
        let mut ring = Self::SyncPtr(Box::<SndPcmSyncPtr>::default());
        ring.set_avail_min(avail_min);
        ring.sync(driver, 0)?;
        Ok(ring)
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    /// Exchanges pointers with the driver. A mapped ring is always current.
    pub fn sync(&mut self, driver: &mut dyn PcmDriver, flags: u32) -> std::io::Result<()> {
        match self {
            Self::Mapped(_) => Ok(()),
            Self::SyncPtr(sync) => {
                sync.flags = flags;
                driver.sync_ptr(sync)
            }
        }
    }

    pub fn hw_ptr(&self) -> u64 {
        match self {
            Self::Mapped(pages) => unsafe {
                u64::from(ptr::read_volatile(ptr::addr_of!((*pages.status.as_ptr()).hw_ptr)))
            },
            Self::SyncPtr(sync) => u64::from(sync.status.hw_ptr),
        }
    }

    pub fn state(&self) -> i32 {
        match self {
            Self::Mapped(pages) => unsafe {
                ptr::read_volatile(ptr::addr_of!((*pages.status.as_ptr()).state))
            },
            Self::SyncPtr(sync) => sync.status.state,
        }
    }

    pub fn tstamp(&self) -> KernelTimespec {
        match self {
            Self::Mapped(pages) => unsafe {
                ptr::read_volatile(ptr::addr_of!((*pages.status.as_ptr()).tstamp))
            },
            Self::SyncPtr(sync) => sync.status.tstamp,
        }
    }

    pub fn appl_ptr(&self) -> u64 {
        match self {
            Self::Mapped(pages) => unsafe {
                u64::from(ptr::read_volatile(ptr::addr_of!((*pages.control.as_ptr()).appl_ptr)))
            },
            Self::SyncPtr(sync) => u64::from(sync.control.appl_ptr),
        }
    }

    pub fn set_appl_ptr(&mut self, value: u64) {
        match self {
            Self::Mapped(pages) => unsafe {
                ptr::write_volatile(
                    ptr::addr_of_mut!((*pages.control.as_ptr()).appl_ptr),
                    value as libc::c_ulong,
                );
            },
            Self::SyncPtr(sync) => sync.control.appl_ptr = value as libc::c_ulong,
        }
    }

    pub fn avail_min(&self) -> u64 {
        match self {
            Self::Mapped(pages) => unsafe {
                u64::from(ptr::read_volatile(
                    ptr::addr_of!((*pages.control.as_ptr()).avail_min),
                ))
            },
            Self::SyncPtr(sync) => u64::from(sync.control.avail_min),
        }
    }

    pub fn set_avail_min(&mut self, value: u64) {
        match self {
            Self::Mapped(pages) => unsafe {
                ptr::write_volatile(
                    ptr::addr_of_mut!((*pages.control.as_ptr()).avail_min),
                    value as libc::c_ulong,
                );
            },
            Self::SyncPtr(sync) => sync.control.avail_min = value as libc::c_ulong,
        }
    }
}

/// Frames the application may move right now, computed without wrapping.
/// `None` means the pointers are inconsistent.
pub fn raw_avail(playback: bool, hw_ptr: u64, appl_ptr: u64, buffer_size: u64) -> Option<u64> {
    let hw = i128::from(hw_ptr);
    let appl = i128::from(appl_ptr);
    let avail = if playback {
        hw + i128::from(buffer_size) - appl
    } else {
        hw - appl
    };
    u64::try_from(avail).ok()
}

/// Available frames with both pointers taken modulo `boundary`.
pub fn wrapped_avail(
    playback: bool,
    hw_ptr: u64,
    appl_ptr: u64,
    buffer_size: u64,
    boundary: u64,
) -> u64 {
    if boundary == 0 {
        return 0;
    }
    let hw = hw_ptr % boundary;
    let appl = appl_ptr % boundary;
    if playback {
        let mut avail = hw + buffer_size;
        if avail < appl {
            avail += boundary;
        }
        avail -= appl;
        if avail >= boundary {
            avail -= boundary;
        }
        avail
    } else if hw >= appl {
        hw - appl
    } else {
        hw + boundary - appl
    }
}
