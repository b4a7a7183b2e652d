#![allow(dead_code)]

use nix::libc;
use pcmio::pcm::ioctl::{
    KernelTimespec, SNDRV_PCM_ACCESS_MMAP_INTERLEAVED, SNDRV_PCM_ACCESS_RW_INTERLEAVED,
    SNDRV_PCM_HW_PARAM_BUFFER_SIZE, SNDRV_PCM_HW_PARAM_FRAME_BITS, SNDRV_PCM_MMAP_OFFSET_CONTROL,
    SNDRV_PCM_MMAP_OFFSET_DATA, SNDRV_PCM_MMAP_OFFSET_STATUS, SNDRV_PCM_SYNC_PTR_APPL,
    SNDRV_PCM_SYNC_PTR_AVAIL_MIN, SNDRV_PCM_SYNC_PTR_HWSYNC, SndPcmHwParams, SndPcmInfo,
    SndPcmMmapControl, SndPcmMmapStatus, SndPcmSwParams, SndPcmSyncPtr,
};
use pcmio::{HwConstraints, PcmDriver, PcmFormat, PcmState, Range, SharedRegion};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn constraints() -> HwConstraints {
    HwConstraints {
        access: (1 << SNDRV_PCM_ACCESS_RW_INTERLEAVED) | (1 << SNDRV_PCM_ACCESS_MMAP_INTERLEAVED),
        format: (1 << PcmFormat::S16Le.to_alsa()) | (1 << PcmFormat::S32Le.to_alsa()),
        bit_width: Range::new(16, 32),
        channels: Range::new(1, 8),
        rate: Range::new(8000, 192_000),
        periods: Range::new(2, 16),
        period_bytes: Range::new(256, 1 << 20),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub hw_refine: usize,
    pub hw_params: usize,
    pub sw_params: usize,
    pub sync_ptr: usize,
    pub prepare: usize,
    pub start: usize,
    pub stop: usize,
    pub drain: usize,
    pub writei: usize,
    pub readi: usize,
    pub wait: usize,
    pub ttstamp: usize,
}

/// Shared view of a mock device, inspected and steered by tests.
pub struct MockState {
    pub constraints: HwConstraints,
    pub capture: bool,
    pub calls: Calls,
    pub state: PcmState,
    pub running: bool,
    pub hw_ptr: u64,
    pub appl_ptr: u64,
    pub avail_min: u64,
    pub buffer_size: u64,
    pub frame_bytes: usize,
    pub sw: Option<SndPcmSwParams>,
    pub transferred: u64,
    pub tstamp: KernelTimespec,
    /// Upcoming transfers that fail with EPIPE.
    pub pending_xruns: u32,
    /// Largest number of frames taken per transfer call.
    pub max_chunk: Option<usize>,
    pub would_block: bool,
    pub mappable_status: bool,
    pub mappable_data: bool,
    pub status: Option<SharedRegion>,
    pub control: Option<SharedRegion>,
    pub data: Option<SharedRegion>,
    pub capture_fill: u8,
    pub linked: Option<RawFd>,
    pub tstamp_type: Option<libc::c_int>,
}

impl MockState {
    fn new(constraints: HwConstraints, capture: bool) -> Self {
        Self {
            constraints,
            capture,
            calls: Calls::default(),
            state: PcmState::Open,
            running: false,
            hw_ptr: 0,
            appl_ptr: 0,
            avail_min: 0,
            buffer_size: 0,
            frame_bytes: 0,
            sw: None,
            transferred: 0,
            tstamp: KernelTimespec::default(),
            pending_xruns: 0,
            max_chunk: None,
            would_block: false,
            mappable_status: false,
            mappable_data: true,
            status: None,
            control: None,
            data: None,
            capture_fill: 0x5a,
            linked: None,
            tstamp_type: None,
        }
    }

    fn start_threshold(&self) -> u64 {
        self.sw
            .map(|sw| sw.start_threshold as u64)
            .unwrap_or(self.buffer_size)
    }

    /// Picks up what the stream wrote into the mapped control page.
    fn pull_control(&mut self) {
        if let Some(control) = self.control.as_ref().and_then(|c| c.typed::<SndPcmMmapControl>()) {
            let control = unsafe { control.as_ptr().read_volatile() };
            self.appl_ptr = control.appl_ptr as u64;
            self.avail_min = control.avail_min as u64;
        }
    }

    fn push_pages(&self) {
        if let Some(status) = self.status.as_ref().and_then(|s| s.typed::<SndPcmMmapStatus>()) {
            let value = SndPcmMmapStatus {
                state: self.state.to_raw(),
                hw_ptr: self.hw_ptr as libc::c_ulong,
                tstamp: self.tstamp,
                ..SndPcmMmapStatus::default()
            };
            unsafe { status.as_ptr().write_volatile(value) };
        }
        if let Some(control) = self.control.as_ref().and_then(|c| c.typed::<SndPcmMmapControl>()) {
            let value = SndPcmMmapControl {
                appl_ptr: self.appl_ptr as libc::c_ulong,
                avail_min: self.avail_min as libc::c_ulong,
            };
            unsafe { control.as_ptr().write_volatile(value) };
        }
    }

    /// The hardware catches up with everything queued (playback) or fills
    /// the whole buffer (capture).
    fn advance(&mut self) {
        if !self.running {
            return;
        }
        self.hw_ptr = if self.capture {
            self.appl_ptr + self.buffer_size
        } else {
            self.appl_ptr
        };
        self.tstamp = KernelTimespec {
            tv_sec: 1,
            tv_nsec: 500,
        };
    }

    fn begin_running(&mut self) {
        self.running = true;
        self.state = PcmState::Running;
        self.advance();
    }

    fn xrun(&mut self) -> std::io::Error {
        self.pending_xruns -= 1;
        self.running = false;
        self.state = PcmState::Xrun;
        std::io::Error::from_raw_os_error(libc::EPIPE)
    }
}

pub struct MockPcm {
    pub state: Arc<Mutex<MockState>>,
    live: Arc<AtomicUsize>,
}

impl Drop for MockPcm {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Mock {
    pub state: Arc<Mutex<MockState>>,
    pub live: Arc<AtomicUsize>,
}

impl Mock {
    pub fn new(capture: bool) -> Self {
        Self::with_constraints(constraints(), capture)
    }

    pub fn with_constraints(constraints: HwConstraints, capture: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new(constraints, capture))),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn driver(&self) -> Box<dyn PcmDriver> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Box::new(MockPcm {
            state: Arc::clone(&self.state),
            live: Arc::clone(&self.live),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn calls(&self) -> Calls {
        self.with(|s| s.calls)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Wakeup threshold as the driver sees it, including what the stream
    /// wrote into a mapped control page.
    pub fn avail_min(&self) -> u64 {
        self.with(|s| {
            s.pull_control();
            s.avail_min
        })
    }
}

fn errno(code: i32) -> std::io::Error {
    std::io::Error::from_raw_os_error(code)
}

impl PcmDriver for MockPcm {
    fn info(&mut self) -> std::io::Result<SndPcmInfo> {
        let s = self.state.lock().unwrap();
        Ok(SndPcmInfo {
            stream: i32::from(s.capture),
            ..SndPcmInfo::default()
        })
    }

    fn hw_refine(&mut self, params: &mut SndPcmHwParams) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.hw_refine += 1;
        s.constraints.refine(params)
    }

    fn hw_params(&mut self, params: &mut SndPcmHwParams) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.hw_params += 1;
        s.constraints.choose(params)?;
        s.buffer_size = params
            .interval(SNDRV_PCM_HW_PARAM_BUFFER_SIZE)
            .map_or(0, |i| i.min as u64);
        s.frame_bytes = params
            .interval(SNDRV_PCM_HW_PARAM_FRAME_BITS)
            .map_or(0, |i| (i.min / 8) as usize);
        s.state = PcmState::Setup;
        Ok(())
    }

    fn sw_params(&mut self, params: &mut SndPcmSwParams) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.sw_params += 1;
        s.sw = Some(*params);
        s.avail_min = params.avail_min as u64;
        Ok(())
    }

    fn sync_ptr(&mut self, sync: &mut SndPcmSyncPtr) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.sync_ptr += 1;
        if sync.flags & SNDRV_PCM_SYNC_PTR_HWSYNC != 0 {
            if s.state == PcmState::Xrun {
                return Err(errno(libc::EPIPE));
            }
            s.advance();
        }
        if sync.flags & SNDRV_PCM_SYNC_PTR_APPL != 0 {
            sync.control.appl_ptr = s.appl_ptr as libc::c_ulong;
        } else {
            s.appl_ptr = sync.control.appl_ptr as u64;
        }
        if sync.flags & SNDRV_PCM_SYNC_PTR_AVAIL_MIN != 0 {
            sync.control.avail_min = s.avail_min as libc::c_ulong;
        } else {
            s.avail_min = sync.control.avail_min as u64;
        }
        sync.status.state = s.state.to_raw();
        sync.status.hw_ptr = s.hw_ptr as libc::c_ulong;
        sync.status.tstamp = s.tstamp;
        Ok(())
    }

    fn prepare(&mut self) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.prepare += 1;
        s.state = PcmState::Prepared;
        s.running = false;
        s.hw_ptr = 0;
        s.appl_ptr = 0;
        s.tstamp = KernelTimespec::default();
        s.push_pages();
        Ok(())
    }

    fn start(&mut self) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.start += 1;
        if s.state != PcmState::Prepared {
            return Err(errno(libc::EBADFD));
        }
        s.pull_control();
        s.begin_running();
        s.push_pages();
        Ok(())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.stop += 1;
        s.running = false;
        s.state = PcmState::Setup;
        s.push_pages();
        Ok(())
    }

    fn drain(&mut self) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.drain += 1;
        s.running = false;
        s.hw_ptr = s.appl_ptr;
        s.state = PcmState::Setup;
        s.push_pages();
        Ok(())
    }

    fn writei(&mut self, data: &[u8], frames: usize) -> std::io::Result<usize> {
        let mut s = self.state.lock().unwrap();
        s.calls.writei += 1;
        assert!(data.len() >= frames * s.frame_bytes, "short write buffer");
        if s.pending_xruns > 0 {
            return Err(s.xrun());
        }
        if !matches!(s.state, PcmState::Prepared | PcmState::Running) {
            return Err(errno(libc::EBADFD));
        }
        if s.would_block {
            return Err(errno(libc::EAGAIN));
        }
        s.advance();
        let space = (s.hw_ptr + s.buffer_size - s.appl_ptr) as usize;
        let n = frames.min(space).min(s.max_chunk.unwrap_or(usize::MAX));
        if n == 0 {
            return Err(errno(libc::EAGAIN));
        }
        s.appl_ptr += n as u64;
        s.transferred += n as u64;
        if !s.running && s.appl_ptr - s.hw_ptr >= s.start_threshold() {
            s.begin_running();
        }
        s.push_pages();
        Ok(n)
    }

    fn readi(&mut self, data: &mut [u8], frames: usize) -> std::io::Result<usize> {
        let mut s = self.state.lock().unwrap();
        s.calls.readi += 1;
        if s.pending_xruns > 0 {
            return Err(s.xrun());
        }
        if s.state != PcmState::Running {
            return Err(errno(libc::EBADFD));
        }
        if s.would_block {
            return Err(errno(libc::EAGAIN));
        }
        s.advance();
        let n = frames.min(s.max_chunk.unwrap_or(usize::MAX));
        let bytes = n * s.frame_bytes;
        data[..bytes].fill(s.capture_fill);
        s.appl_ptr += n as u64;
        s.transferred += n as u64;
        s.push_pages();
        Ok(n)
    }

    fn delay(&mut self) -> std::io::Result<i64> {
        let s = self.state.lock().unwrap();
        Ok(s.appl_ptr as i64 - s.hw_ptr as i64)
    }

    fn ttstamp(&mut self, tstamp_type: libc::c_int) -> std::io::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.calls.ttstamp += 1;
        s.tstamp_type = Some(tstamp_type);
        Ok(())
    }

    fn link(&mut self, other: RawFd) -> std::io::Result<()> {
        self.state.lock().unwrap().linked = Some(other);
        Ok(())
    }

    fn unlink(&mut self) -> std::io::Result<()> {
        self.state.lock().unwrap().linked = None;
        Ok(())
    }

    fn map_region(
        &mut self,
        offset: u64,
        len: usize,
        _writable: bool,
    ) -> std::io::Result<SharedRegion> {
        let mut s = self.state.lock().unwrap();
        let region = SharedRegion::heap(len);
        let keep = region.alias();
        match offset {
            SNDRV_PCM_MMAP_OFFSET_STATUS if s.mappable_status => s.status = keep,
            SNDRV_PCM_MMAP_OFFSET_CONTROL if s.mappable_status => s.control = keep,
            SNDRV_PCM_MMAP_OFFSET_DATA if s.mappable_data => {
                if s.capture {
                    unsafe { std::ptr::write_bytes(region.as_mut_ptr(), s.capture_fill, len) };
                }
                s.data = keep;
            }
            _ => return Err(errno(libc::ENXIO)),
        }
        s.push_pages();
        Ok(region)
    }

    fn wait(&mut self, _timeout_ms: i32) -> std::io::Result<bool> {
        let mut s = self.state.lock().unwrap();
        s.calls.wait += 1;
        if s.state == PcmState::Xrun {
            return Err(errno(libc::EIO));
        }
        s.pull_control();
        s.advance();
        s.push_pages();
        Ok(true)
    }
}
