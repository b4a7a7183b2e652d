use super::ioctl::{
    SndPcmHwParams, SndPcmInfo, SndPcmSwParams, SndPcmSyncPtr, SndXferi, snd_pcm_delay,
    snd_pcm_drain, snd_pcm_drop, snd_pcm_hw_params, snd_pcm_hw_refine, snd_pcm_info,
    snd_pcm_link, snd_pcm_prepare, snd_pcm_readi_frames, snd_pcm_start, snd_pcm_sw_params,
    snd_pcm_sync_ptr, snd_pcm_ttstamp, snd_pcm_unlink, snd_pcm_writei_frames,
};
use super::options::{Direction, PcmFlags};
use nix::libc;
use std::cell::UnsafeCell;
use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

fn unsupported(what: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("{what} is not supported by this device"),
    )
}

/// Operations a stream needs from whatever sits behind it: the kernel node
/// or a virtual device that behaves like one.
///
/// All calls mirror the kernel ioctls: records are updated in place and
/// errors carry the errno the kernel would return (`EPIPE` for xruns,
/// `EAGAIN` when a non-blocking call cannot progress).
pub trait PcmDriver: Send {
    fn info(&mut self) -> std::io::Result<SndPcmInfo>;
    fn hw_refine(&mut self, params: &mut SndPcmHwParams) -> std::io::Result<()>;
    fn hw_params(&mut self, params: &mut SndPcmHwParams) -> std::io::Result<()>;
    fn sw_params(&mut self, params: &mut SndPcmSwParams) -> std::io::Result<()>;
    fn sync_ptr(&mut self, sync: &mut SndPcmSyncPtr) -> std::io::Result<()>;
    fn prepare(&mut self) -> std::io::Result<()>;
    fn start(&mut self) -> std::io::Result<()>;
    /// DROP: stop immediately, discarding pending frames.
    fn stop(&mut self) -> std::io::Result<()>;
    fn drain(&mut self) -> std::io::Result<()>;
    /// Interleaved write of `frames` frames from `data`; returns frames taken.
    fn writei(&mut self, data: &[u8], frames: usize) -> std::io::Result<usize>;
    fn readi(&mut self, data: &mut [u8], frames: usize) -> std::io::Result<usize>;
    fn delay(&mut self) -> std::io::Result<i64>;
    fn ttstamp(&mut self, tstamp_type: libc::c_int) -> std::io::Result<()>;

    fn link(&mut self, _other: RawFd) -> std::io::Result<()> {
        Err(unsupported("stream linking"))
    }

    fn unlink(&mut self) -> std::io::Result<()> {
        Err(unsupported("stream linking"))
    }

    /// Maps `len` bytes at the driver-defined `offset`.
    fn map_region(
        &mut self,
        _offset: u64,
        _len: usize,
        _writable: bool,
    ) -> std::io::Result<SharedRegion> {
        Err(unsupported("memory mapping"))
    }

    /// Waits until the stream can make progress. `Ok(false)` on timeout.
    fn wait(&mut self, timeout_ms: i32) -> std::io::Result<bool>;

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

enum RegionKind {
    Kernel { addr: NonNull<libc::c_void> },
    Heap(Arc<HeapPages>),
}

struct HeapPages {
    words: Box<[UnsafeCell<u64>]>,
}

// Access goes through raw pointers only; callers serialize like they would
// for a kernel mapping.
unsafe impl Send for HeapPages {}
unsafe impl Sync for HeapPages {}

/// Memory shared between the stream and its driver. Kernel mappings are
/// unmapped when the region is dropped.
pub struct SharedRegion {
    kind: RegionKind,
    len: usize,
}

unsafe impl Send for SharedRegion {}

impl SharedRegion {
    pub fn map(fd: RawFd, offset: u64, len: usize, writable: bool) -> std::io::Result<Self> {
        if len == 0 {
            return Err(std::io::Error::from_raw_os_error(libc::EINVAL));
        }
        let prot = if writable {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ
        };
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                prot,
                libc::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }
        let addr = NonNull::new(addr).ok_or_else(std::io::Error::last_os_error)?;
        Ok(Self {
            kind: RegionKind::Kernel { addr },
            len,
        })
    }

    /// Zeroed, 8-byte aligned memory standing in for a mapping.
    pub fn heap(len: usize) -> Self {
        let words = len.div_ceil(8).max(1);
        let pages = HeapPages {
            words: (0..words).map(|_| UnsafeCell::new(0)).collect(),
        };
        Self {
            kind: RegionKind::Heap(Arc::new(pages)),
            len,
        }
    }

    /// Second handle onto the same heap memory, so a virtual driver can keep
    /// updating what it handed out. Kernel mappings cannot be aliased.
    pub fn alias(&self) -> Option<Self> {
        match &self.kind {
            RegionKind::Heap(pages) => Some(Self {
                kind: RegionKind::Heap(Arc::clone(pages)),
                len: self.len,
            }),
            RegionKind::Kernel { .. } => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_kernel_mapping(&self) -> bool {
        matches!(self.kind, RegionKind::Kernel { .. })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        match &self.kind {
            RegionKind::Kernel { addr } => addr.as_ptr() as *mut u8,
            RegionKind::Heap(pages) => pages.words.as_ptr() as *mut u8,
        }
    }

    /// Typed pointer to the start of the region, if it is large enough.
    pub fn typed<T>(&self) -> Option<NonNull<T>> {
        if self.len < std::mem::size_of::<T>() {
            return None;
        }
        NonNull::new(self.as_mut_ptr() as *mut T)
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let RegionKind::Kernel { addr } = &self.kind {
            unsafe {
                let _ = libc::munmap(addr.as_ptr(), self.len);
            }
        }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("len", &self.len)
            .field("kernel", &self.is_kernel_mapping())
            .finish()
    }
}

/// Kernel PCM node (`pcmC<card>D<device><p|c>`).
#[derive(Debug)]
pub struct HwPcm {
    node: File,
    path: PathBuf,
    direction: Direction,
}

impl HwPcm {
    pub fn open(path: &Path, flags: PcmFlags) -> std::io::Result<Self> {
        let mut binding = File::options();
        let mut custom = libc::O_CLOEXEC;
        if flags.contains(PcmFlags::NONBLOCK) {
            custom |= libc::O_NONBLOCK;
        }
        binding.read(true).write(true).custom_flags(custom);
        let node = binding.open(path)?;
        Ok(Self {
            node,
            path: path.to_path_buf(),
            direction: Direction::from_flags(flags),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.node.as_raw_fd()
    }
}

impl PcmDriver for HwPcm {
    fn info(&mut self) -> std::io::Result<SndPcmInfo> {
        let mut info = SndPcmInfo::default();
        unsafe { snd_pcm_info(self.fd(), &mut info) }
            .map_err(|_| std::io::Error::last_os_error())?;
        Ok(info)
    }

    fn hw_refine(&mut self, params: &mut SndPcmHwParams) -> std::io::Result<()> {
        unsafe { snd_pcm_hw_refine(self.fd(), params) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn hw_params(&mut self, params: &mut SndPcmHwParams) -> std::io::Result<()> {
        unsafe { snd_pcm_hw_params(self.fd(), params) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn sw_params(&mut self, params: &mut SndPcmSwParams) -> std::io::Result<()> {
        unsafe { snd_pcm_sw_params(self.fd(), params) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn sync_ptr(&mut self, sync: &mut SndPcmSyncPtr) -> std::io::Result<()> {
        unsafe { snd_pcm_sync_ptr(self.fd(), sync) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn prepare(&mut self) -> std::io::Result<()> {
        unsafe { snd_pcm_prepare(self.fd()) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn start(&mut self) -> std::io::Result<()> {
        unsafe { snd_pcm_start(self.fd()) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        unsafe { snd_pcm_drop(self.fd()) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn drain(&mut self) -> std::io::Result<()> {
        unsafe { snd_pcm_drain(self.fd()) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn writei(&mut self, data: &[u8], frames: usize) -> std::io::Result<usize> {
        let mut xfer = SndXferi {
            result: 0,
            buf: data.as_ptr() as *mut libc::c_void,
            frames: frames as libc::c_ulong,
        };
        unsafe { snd_pcm_writei_frames(self.fd(), &mut xfer) }
            .map_err(|_| std::io::Error::last_os_error())?;
        Ok(xfer.result.max(0) as usize)
    }

    fn readi(&mut self, data: &mut [u8], frames: usize) -> std::io::Result<usize> {
        let mut xfer = SndXferi {
            result: 0,
            buf: data.as_mut_ptr() as *mut libc::c_void,
            frames: frames as libc::c_ulong,
        };
        unsafe { snd_pcm_readi_frames(self.fd(), &mut xfer) }
            .map_err(|_| std::io::Error::last_os_error())?;
        Ok(xfer.result.max(0) as usize)
    }

    fn delay(&mut self) -> std::io::Result<i64> {
        let mut frames: libc::c_long = 0;
        unsafe { snd_pcm_delay(self.fd(), &mut frames) }
            .map_err(|_| std::io::Error::last_os_error())?;
        Ok(frames as i64)
    }

    fn ttstamp(&mut self, tstamp_type: libc::c_int) -> std::io::Result<()> {
        unsafe { snd_pcm_ttstamp(self.fd(), &tstamp_type) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn link(&mut self, other: RawFd) -> std::io::Result<()> {
        unsafe { snd_pcm_link(self.fd(), other) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn unlink(&mut self) -> std::io::Result<()> {
        unsafe { snd_pcm_unlink(self.fd()) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn map_region(
        &mut self,
        offset: u64,
        len: usize,
        writable: bool,
    ) -> std::io::Result<SharedRegion> {
        SharedRegion::map(self.fd(), offset, len, writable)
    }

    fn wait(&mut self, timeout_ms: i32) -> std::io::Result<bool> {
        let events = match self.direction {
            Direction::Playback => libc::POLLOUT,
            Direction::Capture => libc::POLLIN,
        };
        let mut pfd = libc::pollfd {
            fd: self.fd(),
            events,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if rc == 0 {
            return Ok(false);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            return Err(std::io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(true)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.fd())
    }
}
