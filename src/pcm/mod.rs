//! PCM streams: open, negotiate, and move frames to or from a device.
//!
//! A [`Pcm`] is always returned by the open functions. When something goes
//! wrong during open the handle is not ready: [`Pcm::is_ready`] is false,
//! [`Pcm::error`] explains why, and every operation fails with
//! [`Error::NotReady`]. Dropping the handle releases whatever was acquired.

pub mod constraints;
pub mod driver;
mod io_util;
pub mod ioctl;
pub mod options;
pub mod params;
pub mod ring;

use crate::device;
use crate::error::{ERROR_MAX, Error, Result, cap};
use driver::{HwPcm, PcmDriver, SharedRegion};
use ioctl::{
    SNDRV_PCM_MMAP_OFFSET_DATA, SNDRV_PCM_SYNC_PTR_APPL, SNDRV_PCM_SYNC_PTR_AVAIL_MIN,
    SNDRV_PCM_SYNC_PTR_HWSYNC, SNDRV_PCM_TSTAMP_ENABLE, SNDRV_PCM_TSTAMP_TYPE_MONOTONIC,
    SndPcmSwParams,
};
use nix::libc;
use options::{Direction, PcmFlags, StreamConfig};
use params::{HwParamSet, PcmParam};
use ring::RingBuffer;
use std::os::fd::RawFd;
use std::time::Duration;

/// Driver-side stream state, as reported in the status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmState {
    Open,
    Setup,
    Prepared,
    Running,
    Xrun,
    Draining,
    Paused,
    Suspended,
    Disconnected,
    Unknown(i32),
}

impl PcmState {
    pub fn from_raw(value: i32) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Setup,
            2 => Self::Prepared,
            3 => Self::Running,
            4 => Self::Xrun,
            5 => Self::Draining,
            6 => Self::Paused,
            7 => Self::Suspended,
            8 => Self::Disconnected,
            other => Self::Unknown(other),
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            Self::Open => 0,
            Self::Setup => 1,
            Self::Prepared => 2,
            Self::Running => 3,
            Self::Xrun => 4,
            Self::Draining => 5,
            Self::Paused => 6,
            Self::Suspended => 7,
            Self::Disconnected => 8,
            Self::Unknown(other) => other,
        }
    }
}

/// Contiguous slice of the data area handed out by [`Pcm::mmap_begin`].
/// Both fields count frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmapRegion {
    pub offset: usize,
    pub frames: usize,
}

/// Largest ring pointer position before it wraps back to zero.
pub fn compute_boundary(buffer_size: u64) -> u64 {
    if buffer_size == 0 {
        return 0;
    }
    let limit = i32::MAX as u64;
    let mut boundary = buffer_size;
    while boundary * 2 <= limit.saturating_sub(buffer_size) {
        boundary *= 2;
    }
    boundary
}

struct Negotiated {
    config: StreamConfig,
    buffer_size: u64,
    boundary: u64,
    card: u32,
    device: u32,
    subdevice: u32,
    ring: RingBuffer,
    data: Option<SharedRegion>,
}

fn negotiate(
    driver: &mut dyn PcmDriver,
    flags: PcmFlags,
    requested: &StreamConfig,
) -> Result<Negotiated> {
    requested.validate()?;
    let info = driver
        .info()
        .map_err(|e| Error::driver("cannot get info", e))?;

    let mut params = HwParamSet::from_config(requested, flags);
    if let Err(source) = params.install(driver) {
        let limits = HwParamSet::query_capabilities(driver).ok().map(Box::new);
        return Err(Error::Config {
            context: "cannot set hw params".into(),
            source,
            limits,
        });
    }

    let mut config = requested.clone();
    let period_size = params
        .single_value(PcmParam::PeriodSize)
        .unwrap_or(params.min(PcmParam::PeriodSize));
    if period_size != 0 && period_size != config.period_size {
        tracing::warn!(
            "period size changed by driver: requested {} got {}",
            config.period_size,
            period_size
        );
        config.period_size = period_size;
    }
    if let Some(periods) = params.single_value(PcmParam::Periods) {
        config.period_count = periods;
    }
    if let Some(rate) = params.single_value(PcmParam::Rate).filter(|r| *r != config.rate) {
        tracing::warn!("rate changed by driver: requested {} got {}", config.rate, rate);
        config.rate = rate;
    }

    let buffer_size = config.buffer_size();
    let mut sw = SndPcmSwParams {
        tstamp_mode: SNDRV_PCM_TSTAMP_ENABLE,
        period_step: 1,
        avail_min: config.effective_avail_min() as libc::c_ulong,
        xfer_align: (config.period_size / 2) as libc::c_ulong,
        start_threshold: config.effective_start_threshold() as libc::c_ulong,
        stop_threshold: config.effective_stop_threshold() as libc::c_ulong,
        silence_threshold: config.silence_threshold as libc::c_ulong,
        silence_size: config.silence_size as libc::c_ulong,
        boundary: compute_boundary(buffer_size) as libc::c_ulong,
        ..SndPcmSwParams::default()
    };
    driver
        .sw_params(&mut sw)
        .map_err(|e| Error::driver("cannot set sw params", e))?;
    let boundary = if sw.boundary != 0 {
        u64::from(sw.boundary)
    } else {
        compute_boundary(buffer_size)
    };

    let avail_min = u64::from(sw.avail_min);
    let ring = RingBuffer::establish(driver, crate::config::force_sync_ptr(), avail_min)
        .map_err(|e| Error::driver("cannot map status/control", e))?;

    let data = if flags.contains(PcmFlags::MMAP) {
        let len = buffer_size as usize * config.frame_bytes();
        let region = driver
            .map_region(SNDRV_PCM_MMAP_OFFSET_DATA, len, true)
            .map_err(|e| Error::driver("cannot map data buffer", e))?;
        Some(region)
    } else {
        None
    };

    if flags.contains(PcmFlags::MONOTONIC) {
        driver
            .ttstamp(SNDRV_PCM_TSTAMP_TYPE_MONOTONIC)
            .map_err(|e| Error::driver("cannot set timestamp type", e))?;
    }

    Ok(Negotiated {
        config,
        buffer_size,
        boundary,
        card: info.card.max(0) as u32,
        device: info.device,
        subdevice: info.subdevice,
        ring,
        data,
    })
}

pub struct Pcm {
    // Mappings go before the driver so they are released first.
    ring: Option<RingBuffer>,
    data: Option<SharedRegion>,
    driver: Option<Box<dyn PcmDriver>>,
    flags: PcmFlags,
    config: StreamConfig,
    error: String,
    open_error: Option<Error>,
    prepared: bool,
    running: bool,
    underruns: u32,
    buffer_size: u64,
    boundary: u64,
    card: u32,
    device: u32,
    subdevice: u32,
}

impl std::fmt::Debug for Pcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pcm")
            .field("card", &self.card)
            .field("device", &self.device)
            .field("flags", &self.flags)
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .field("prepared", &self.prepared)
            .field("running", &self.running)
            .field("underruns", &self.underruns)
            .field("error", &self.error)
            .finish()
    }
}

impl Pcm {
    fn not_ready(flags: PcmFlags, config: &StreamConfig, err: Error) -> Self {
        let mut pcm = Self {
            ring: None,
            data: None,
            driver: None,
            flags,
            config: config.clone(),
            error: String::new(),
            open_error: None,
            prepared: false,
            running: false,
            underruns: 0,
            buffer_size: 0,
            boundary: 0,
            card: 0,
            device: 0,
            subdevice: 0,
        };
        pcm.error = cap(&err.to_string(), ERROR_MAX);
        pcm.open_error = Some(err);
        pcm
    }

    /// Opens `pcmC<card>D<device><p|c>` under the configured device directory.
    pub fn open(card: u32, device: u32, flags: PcmFlags, config: &StreamConfig) -> Self {
        let path = device::pcm_path(card, device, Direction::from_flags(flags));
        let mut pcm = match HwPcm::open(&path, flags) {
            Ok(hw) => Self::open_with_driver(Box::new(hw), flags, config),
            Err(e) => {
                let context = format!("cannot open device '{}'", path.display());
                Self::not_ready(flags, config, Error::driver(context, e))
            }
        };
        if !pcm.is_ready() {
            pcm.card = card;
            pcm.device = device;
        }
        pcm
    }

    /// Opens a device named `hw:<card>,<device>`.
    pub fn open_by_name(name: &str, flags: PcmFlags, config: &StreamConfig) -> Self {
        match device::parse_name(name) {
            Ok((card, dev)) => Self::open(card, dev, flags, config),
            Err(e) => Self::not_ready(flags, config, e),
        }
    }

    /// Sets up a stream over any driver. Behaves exactly like [`Pcm::open`]
    /// once the device node has been opened.
    pub fn open_with_driver(
        mut driver: Box<dyn PcmDriver>,
        flags: PcmFlags,
        config: &StreamConfig,
    ) -> Self {
        match negotiate(driver.as_mut(), flags, config) {
            Ok(n) => {
                tracing::debug!(
                    "pcm {}:{} {} ready: {} frames, boundary {}, {}",
                    n.card,
                    n.device,
                    Direction::from_flags(flags).as_str(),
                    n.buffer_size,
                    n.boundary,
                    if n.ring.is_mapped() {
                        "mapped status"
                    } else {
                        "sync_ptr"
                    }
                );
                Self {
                    ring: Some(n.ring),
                    data: n.data,
                    driver: Some(driver),
                    flags,
                    config: n.config,
                    error: String::new(),
                    open_error: None,
                    prepared: false,
                    running: false,
                    underruns: 0,
                    buffer_size: n.buffer_size,
                    boundary: n.boundary,
                    card: n.card,
                    device: n.device,
                    subdevice: n.subdevice,
                }
            }
            // `driver` drops here, closing the node.
            Err(e) => Self::not_ready(flags, config, e),
        }
    }

    /// Renegotiates an open stream that is not running.
    pub fn set_config(&mut self, config: &StreamConfig) -> Result<()> {
        if self.running {
            let err = Error::InvalidArgument("cannot reconfigure a running stream".into());
            return Err(self.fail(err));
        }
        let Some(mut driver) = self.driver.take() else {
            return Err(Error::NotReady(self.error.clone()));
        };
        self.ring = None;
        self.data = None;
        self.prepared = false;
        let result = negotiate(driver.as_mut(), self.flags, config);
        self.driver = Some(driver);
        match result {
            Ok(n) => {
                self.ring = Some(n.ring);
                self.data = n.data;
                self.config = n.config;
                self.buffer_size = n.buffer_size;
                self.boundary = n.boundary;
                self.subdevice = n.subdevice;
                self.error.clear();
                self.open_error = None;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Releases the stream. Equivalent to dropping it.
    pub fn close(self) {}

    pub fn is_ready(&self) -> bool {
        self.driver.is_some() && self.ring.is_some()
    }

    /// Text of the most recent failure, empty if none.
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Why the open failed, with driver limits for rejected configurations.
    pub fn open_error(&self) -> Option<&Error> {
        self.open_error.as_ref()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn flags(&self) -> PcmFlags {
        self.flags
    }

    pub fn direction(&self) -> Direction {
        Direction::from_flags(self.flags)
    }

    pub fn channels(&self) -> u32 {
        self.config.channels
    }

    pub fn rate(&self) -> u32 {
        self.config.rate
    }

    pub fn format(&self) -> crate::format::PcmFormat {
        self.config.format
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    pub fn boundary(&self) -> u64 {
        self.boundary
    }

    pub fn card(&self) -> u32 {
        self.card
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    pub fn subdevice(&self) -> u32 {
        self.subdevice
    }

    pub fn underruns(&self) -> u32 {
        self.underruns
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.driver.as_ref().and_then(|d| d.raw_fd())
    }

    /// True when status/control are real shared pages rather than SYNC_PTR.
    pub fn uses_mapped_status(&self) -> bool {
        self.ring.as_ref().is_some_and(RingBuffer::is_mapped)
    }

    pub fn frame_bytes(&self) -> usize {
        self.config.frame_bytes()
    }

    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.frame_bytes()
    }

    pub fn bytes_to_frames(&self, bytes: usize) -> usize {
        match self.frame_bytes() {
            0 => 0,
            fb => bytes / fb,
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.error = cap(&err.to_string(), ERROR_MAX);
        err
    }

    fn parts(&mut self) -> Result<(&mut dyn PcmDriver, &mut RingBuffer)> {
        match (self.driver.as_mut(), self.ring.as_mut()) {
            (Some(driver), Some(ring)) => Ok((driver.as_mut(), ring)),
            _ => Err(Error::NotReady(self.error.clone())),
        }
    }

    fn is_capture(&self) -> bool {
        self.flags.contains(PcmFlags::IN)
    }

    pub fn prepare(&mut self) -> Result<()> {
        let (driver, ring) = self.parts()?;
        let result = driver
            .prepare()
            .map_err(|e| Error::driver("cannot prepare channel", e))
            // Pull the reset application pointer back from the driver.
            .and_then(|()| {
                ring.sync(driver, SNDRV_PCM_SYNC_PTR_APPL | SNDRV_PCM_SYNC_PTR_AVAIL_MIN)
                    .map_err(|e| Error::driver("cannot sync stream pointers", e))
            });
        match result {
            Ok(()) => {
                self.prepared = true;
                self.running = false;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::NotReady(self.error.clone()));
        }
        if !self.prepared {
            self.prepare()?;
        }
        let (driver, _) = self.parts()?;
        match driver.start() {
            Ok(()) => {
                self.running = true;
                Ok(())
            }
            Err(e) => Err(self.fail(Error::driver("cannot start channel", e))),
        }
    }

    /// Stops immediately, dropping pending frames.
    pub fn stop(&mut self) -> Result<()> {
        let (driver, _) = self.parts()?;
        match driver.stop() {
            Ok(()) => {
                self.prepared = false;
                self.running = false;
                Ok(())
            }
            Err(e) => Err(self.fail(Error::driver("cannot stop channel", e))),
        }
    }

    /// Stops after the queued frames have played.
    pub fn drain(&mut self) -> Result<()> {
        let (driver, _) = self.parts()?;
        match driver.drain() {
            Ok(()) => {
                self.prepared = false;
                self.running = false;
                Ok(())
            }
            Err(e) => Err(self.fail(Error::driver("cannot drain channel", e))),
        }
    }

    /// Frames that can be written (playback) or read (capture) now.
    pub fn available(&mut self) -> Result<u64> {
        let playback = !self.is_capture();
        let buffer_size = self.buffer_size;
        let (driver, ring) = self.parts()?;
        if let Err(e) = ring.sync(driver, SNDRV_PCM_SYNC_PTR_APPL | SNDRV_PCM_SYNC_PTR_HWSYNC) {
            return Err(self.fail(Error::driver("cannot sync stream pointers", e)));
        }
        let (hw_ptr, appl_ptr) = (ring.hw_ptr(), ring.appl_ptr());
        match ring::raw_avail(playback, hw_ptr, appl_ptr, buffer_size) {
            Some(avail) => Ok(avail),
            None => Err(self.fail(Error::PointerFault { hw_ptr, appl_ptr })),
        }
    }

    /// Available frames together with the driver's timestamp of the last
    /// pointer update.
    pub fn htimestamp(&mut self) -> Result<(u64, Duration)> {
        let avail = self.available()?;
        let (_, ring) = self.parts()?;
        let ts = ring.tstamp();
        if ts.is_zero() {
            return Err(self.fail(Error::NoTimestamp));
        }
        let elapsed = Duration::new(
            ts.tv_sec.max(0) as u64,
            ts.tv_nsec.clamp(0, 999_999_999) as u32,
        );
        Ok((avail, elapsed))
    }

    pub fn delay(&mut self) -> Result<i64> {
        let (driver, _) = self.parts()?;
        match driver.delay() {
            Ok(frames) => Ok(frames),
            Err(e) => Err(self.fail(Error::driver("cannot get delay", e))),
        }
    }

    pub fn state(&mut self) -> Result<PcmState> {
        let (driver, ring) = self.parts()?;
        if let Err(e) = ring.sync(driver, SNDRV_PCM_SYNC_PTR_APPL) {
            return Err(self.fail(Error::driver("cannot sync stream pointers", e)));
        }
        Ok(PcmState::from_raw(ring.state()))
    }

    /// Waits until frames can be moved. `Ok(false)` on timeout.
    pub fn wait(&mut self, timeout_ms: i32) -> Result<bool> {
        let (driver, _) = self.parts()?;
        match driver.wait(timeout_ms) {
            Ok(ready) => Ok(ready),
            Err(e) if e.raw_os_error() == Some(libc::EIO) => {
                let err = match self.state()? {
                    PcmState::Xrun => Error::Xrun {
                        context: "wait".into(),
                    },
                    PcmState::Suspended => Error::driver(
                        "stream suspended",
                        std::io::Error::from_raw_os_error(libc::ESTRPIPE),
                    ),
                    PcmState::Disconnected => Error::driver(
                        "stream disconnected",
                        std::io::Error::from_raw_os_error(libc::ENODEV),
                    ),
                    _ => Error::driver("poll error", e),
                };
                Err(self.fail(err))
            }
            Err(e) => Err(self.fail(Error::driver("cannot wait for stream", e))),
        }
    }

    /// Starts and stops together with `other`.
    pub fn link(&mut self, other: &Pcm) -> Result<()> {
        let Some(fd) = other.raw_fd() else {
            let err = Error::InvalidArgument("peer stream has no descriptor".into());
            return Err(self.fail(err));
        };
        let (driver, _) = self.parts()?;
        match driver.link(fd) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(Error::driver("cannot link channel", e))),
        }
    }

    pub fn unlink(&mut self) -> Result<()> {
        let (driver, _) = self.parts()?;
        match driver.unlink() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(Error::driver("cannot unlink channel", e))),
        }
    }

    /// Counts an xrun and decides whether the transfer may restart.
    fn recover_xrun(&mut self, context: &str, retried: &mut bool) -> Result<()> {
        self.underruns += 1;
        self.running = false;
        self.prepared = false;
        tracing::warn!(
            "pcm {}:{} xrun during {} (total {})",
            self.card,
            self.device,
            context,
            self.underruns
        );
        if self.flags.contains(PcmFlags::NORESTART) || *retried {
            return Err(self.fail(Error::Xrun {
                context: context.to_string(),
            }));
        }
        *retried = true;
        Ok(())
    }

    fn check_transfer(&mut self, capture: bool, len: usize, frames: usize) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::NotReady(self.error.clone()));
        }
        if capture != self.is_capture() {
            let what = if capture {
                "read from a playback"
            } else {
                "write to a capture"
            };
            return Err(self.fail(Error::InvalidArgument(format!("cannot {what} stream"))));
        }
        if len < self.frames_to_bytes(frames) {
            return Err(self.fail(Error::InvalidArgument(format!(
                "buffer of {len} bytes holds fewer than {frames} frames"
            ))));
        }
        Ok(())
    }

    /// Writes `frames` interleaved frames, restarting once after an underrun.
    /// Returns the number of frames written, which is all of them unless an
    /// error is returned.
    pub fn writei(&mut self, data: &[u8], frames: usize) -> Result<usize> {
        self.check_transfer(false, data.len(), frames)?;
        if self.flags.contains(PcmFlags::MMAP) {
            return self.mmap_write(data, frames);
        }
        let fb = self.frame_bytes();
        let mut done = 0;
        let mut retried = false;
        while done < frames {
            if !self.running && !self.prepared {
                self.prepare()?;
            }
            let (driver, _) = self.parts()?;
            match driver.writei(&data[done * fb..frames * fb], frames - done) {
                Ok(0) => {
                    let e = std::io::Error::from_raw_os_error(libc::EIO);
                    return Err(self.fail(Error::driver("cannot write stream data", e)));
                }
                Ok(n) => {
                    done += n.min(frames - done);
                    self.running = true;
                    retried = false;
                }
                Err(e) if e.raw_os_error() == Some(libc::EPIPE) => {
                    self.recover_xrun("write", &mut retried)?;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(self.fail(Error::WouldBlock { transferred: done }));
                }
                Err(e) => return Err(self.fail(Error::driver("cannot write stream data", e))),
            }
        }
        Ok(done)
    }

    /// Reads `frames` interleaved frames, starting the stream if needed and
    /// restarting once after an overrun.
    pub fn readi(&mut self, data: &mut [u8], frames: usize) -> Result<usize> {
        self.check_transfer(true, data.len(), frames)?;
        if self.flags.contains(PcmFlags::MMAP) {
            return self.mmap_read(data, frames);
        }
        let fb = self.frame_bytes();
        let mut done = 0;
        let mut retried = false;
        while done < frames {
            if !self.running {
                self.start()?;
            }
            let (driver, _) = self.parts()?;
            match driver.readi(&mut data[done * fb..frames * fb], frames - done) {
                Ok(0) => {
                    let e = std::io::Error::from_raw_os_error(libc::EIO);
                    return Err(self.fail(Error::driver("cannot read stream data", e)));
                }
                Ok(n) => {
                    done += n.min(frames - done);
                    retried = false;
                }
                Err(e) if e.raw_os_error() == Some(libc::EPIPE) => {
                    self.recover_xrun("read", &mut retried)?;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(self.fail(Error::WouldBlock { transferred: done }));
                }
                Err(e) => return Err(self.fail(Error::driver("cannot read stream data", e))),
            }
        }
        Ok(done)
    }

    /// Byte-count form of [`Pcm::writei`]. Returns bytes written.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let fb = self.frame_bytes();
        if fb == 0 || !data.len().is_multiple_of(fb) {
            return Err(self.fail(Error::InvalidArgument(format!(
                "{} bytes is not a whole number of frames",
                data.len()
            ))));
        }
        let frames = self.writei(data, data.len() / fb)?;
        Ok(frames * fb)
    }

    /// Byte-count form of [`Pcm::readi`]. Returns bytes read.
    pub fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        let fb = self.frame_bytes();
        if fb == 0 || !data.len().is_multiple_of(fb) {
            return Err(self.fail(Error::InvalidArgument(format!(
                "{} bytes is not a whole number of frames",
                data.len()
            ))));
        }
        let frames = data.len() / fb;
        let frames = self.readi(data, frames)?;
        Ok(frames * fb)
    }

    /// Available frames for the mapped data path, with pointers taken
    /// modulo the boundary.
    pub fn avail_update(&mut self) -> Result<u64> {
        let playback = !self.is_capture();
        let (buffer_size, boundary) = (self.buffer_size, self.boundary);
        let (driver, ring) = self.parts()?;
        match ring.sync(driver, SNDRV_PCM_SYNC_PTR_APPL | SNDRV_PCM_SYNC_PTR_HWSYNC) {
            Ok(()) => Ok(ring::wrapped_avail(
                playback,
                ring.hw_ptr(),
                ring.appl_ptr(),
                buffer_size,
                boundary,
            )),
            Err(e) if e.raw_os_error() == Some(libc::EPIPE) => Err(self.fail(Error::Xrun {
                context: "pointer sync".into(),
            })),
            Err(e) => Err(self.fail(Error::driver("cannot sync stream pointers", e))),
        }
    }

    /// Next contiguous run of the data area the application may touch, at
    /// most `frames` long.
    pub fn mmap_begin(&mut self, frames: usize) -> Result<MmapRegion> {
        if self.data.is_none() {
            let err = Error::InvalidArgument("stream was not opened with MMAP".into());
            return Err(self.fail(err));
        }
        let avail = self.avail_update()?;
        let buffer_size = self.buffer_size.max(1);
        let (_, ring) = self.parts()?;
        let offset = ring.appl_ptr() % buffer_size;
        let contiguous = buffer_size - offset;
        let frames = (frames as u64).min(avail).min(contiguous);
        Ok(MmapRegion {
            offset: offset as usize,
            frames: frames as usize,
        })
    }

    /// The whole mapped data area.
    pub fn mmap_area(&mut self) -> Option<&mut [u8]> {
        let data = self.data.as_ref()?;
        Some(unsafe { std::slice::from_raw_parts_mut(data.as_mut_ptr(), data.len()) })
    }

    /// Hands `frames` frames at the region's offset over to the driver.
    /// At most the currently available frames may be committed.
    pub fn mmap_commit(&mut self, region: MmapRegion) -> Result<()> {
        let avail = self.avail_update()?;
        if region.frames as u64 > avail {
            return Err(self.fail(Error::InvalidArgument(format!(
                "cannot commit {} frames with {} available",
                region.frames, avail
            ))));
        }
        let boundary = self.boundary.max(1);
        let (driver, ring) = self.parts()?;
        let appl = (ring.appl_ptr() + region.frames as u64) % boundary;
        ring.set_appl_ptr(appl);
        match ring.sync(driver, 0) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(Error::driver("cannot commit frames", e))),
        }
    }

    fn mmap_wait_timeout(&self) -> i32 {
        let rate = u64::from(self.config.rate.max(1));
        let buffer_ms = self.buffer_size * 1000 / rate;
        (buffer_ms * 10).clamp(100, i32::MAX as u64) as i32
    }

    fn mmap_wait(&mut self, done: usize, retried: &mut bool) -> Result<()> {
        if self.flags.contains(PcmFlags::NONBLOCK) {
            return Err(self.fail(Error::WouldBlock { transferred: done }));
        }
        match self.wait(self.mmap_wait_timeout()) {
            Ok(true) => Ok(()),
            Ok(false) => {
                let e = std::io::Error::from_raw_os_error(libc::ETIMEDOUT);
                Err(self.fail(Error::driver("timed out waiting for stream", e)))
            }
            Err(Error::Xrun { .. }) => self.recover_xrun("mmap wait", retried),
            Err(e) => Err(e),
        }
    }

    /// Copies `frames` frames into the mapped buffer, starting playback once
    /// the start threshold is queued.
    pub fn mmap_write(&mut self, data: &[u8], frames: usize) -> Result<usize> {
        self.check_transfer(false, data.len(), frames)?;
        let fb = self.frame_bytes();
        let start_threshold = self.config.effective_start_threshold().min(self.buffer_size);
        let mut done = 0;
        let mut retried = false;
        while done < frames {
            if !self.running && !self.prepared {
                self.prepare()?;
            }
            let avail = match self.avail_update() {
                Ok(avail) => avail,
                Err(Error::Xrun { .. }) => {
                    self.recover_xrun("mmap write", &mut retried)?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !self.running && self.buffer_size - avail.min(self.buffer_size) >= start_threshold {
                self.start()?;
            }
            if avail == 0 {
                if !self.running {
                    self.start()?;
                }
                self.mmap_wait(done, &mut retried)?;
                continue;
            }
            let region = self.mmap_begin(frames - done)?;
            if let Some(area) = self.data.as_ref() {
                let src = &data[done * fb..(done + region.frames) * fb];
                io_util::area_write(area, region.offset * fb, src);
            }
            self.mmap_commit(region)?;
            done += region.frames;
            retried = false;
        }
        if !self.running {
            let queued = self.buffer_size - self.avail_update()?.min(self.buffer_size);
            if queued >= start_threshold {
                self.start()?;
            }
        }
        Ok(done)
    }

    /// Copies `frames` frames out of the mapped buffer, starting capture first.
    pub fn mmap_read(&mut self, data: &mut [u8], frames: usize) -> Result<usize> {
        self.check_transfer(true, data.len(), frames)?;
        let fb = self.frame_bytes();
        let mut done = 0;
        let mut retried = false;
        while done < frames {
            if !self.running {
                self.start()?;
            }
            let avail = match self.avail_update() {
                Ok(avail) => avail,
                Err(Error::Xrun { .. }) => {
                    self.recover_xrun("mmap read", &mut retried)?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if avail == 0 {
                self.mmap_wait(done, &mut retried)?;
                continue;
            }
            let region = self.mmap_begin(frames - done)?;
            if let Some(area) = self.data.as_ref() {
                let dst = &mut data[done * fb..(done + region.frames) * fb];
                io_util::area_read(area, region.offset * fb, dst);
            }
            self.mmap_commit(region)?;
            done += region.frames;
            retried = false;
        }
        Ok(done)
    }
}

impl Drop for Pcm {
    fn drop(&mut self) {
        if self.flags.contains(PcmFlags::MMAP)
            && self.running
            && let Some(driver) = self.driver.as_mut()
        {
            let _ = driver.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_largest_power_of_two_multiple() {
        assert_eq!(compute_boundary(0), 0);
        let b = compute_boundary(3072);
        assert_eq!(b % 3072, 0);
        assert!((b / 3072).is_power_of_two());
        assert!(b * 2 > i32::MAX as u64 - 3072);
        assert!(b <= i32::MAX as u64);
    }

    #[test]
    fn state_codes_round_trip() {
        for raw in 0..=8 {
            assert_eq!(PcmState::from_raw(raw).to_raw(), raw);
        }
        assert_eq!(PcmState::from_raw(4), PcmState::Xrun);
        assert_eq!(PcmState::from_raw(42), PcmState::Unknown(42));
    }

    #[test]
    fn failed_open_yields_not_ready_handle() {
        let config = StreamConfig::default();
        let mut pcm = Pcm::open_by_name("hw:nope", PcmFlags::empty(), &config);
        assert!(!pcm.is_ready());
        assert!(!pcm.error().is_empty());
        assert!(matches!(pcm.open_error(), Some(Error::InvalidArgument(_))));
        assert!(matches!(pcm.prepare(), Err(Error::NotReady(_))));
        assert!(matches!(pcm.available(), Err(Error::NotReady(_))));
        assert!(matches!(pcm.writei(&[0; 4], 1), Err(Error::NotReady(_))));
        assert!(pcm.raw_fd().is_none());
        pcm.close();
    }
}
