use crate::ioctl::{
    SndCtlCardInfo, SndCtlElemId, SndCtlElemInfo, SndCtlElemList, SndCtlElemValue, SndCtlEvent,
    snd_ctl_card_info, snd_ctl_elem_info, snd_ctl_elem_list, snd_ctl_elem_read,
    snd_ctl_elem_write, snd_ctl_subscribe_events, snd_ctl_tlv_read, snd_ctl_tlv_write, tlv_buffer,
    tlv_fill, tlv_payload,
};
use nix::libc;
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Control-plane operations behind a [`crate::Mixer`]: the kernel node or a
/// virtual card.
pub trait ControlDriver: Send {
    fn card_info(&mut self) -> std::io::Result<SndCtlCardInfo>;
    /// Total number of controls the card currently exposes.
    fn elem_count(&mut self) -> std::io::Result<u32>;
    /// Ids of up to `space` controls starting at list position `offset`.
    fn elem_ids(&mut self, offset: u32, space: u32) -> std::io::Result<Vec<SndCtlElemId>>;
    /// Fills `info` for the control named by `info.id`. For enumerated
    /// controls the item selected in the value area gets its name filled.
    fn elem_info(&mut self, info: &mut SndCtlElemInfo) -> std::io::Result<()>;
    fn elem_read(&mut self, value: &mut SndCtlElemValue) -> std::io::Result<()>;
    fn elem_write(&mut self, value: &mut SndCtlElemValue) -> std::io::Result<()>;
    /// Reads `data.len()` bytes of TLV payload.
    fn tlv_read(&mut self, numid: u32, data: &mut [u8]) -> std::io::Result<()>;
    fn tlv_write(&mut self, numid: u32, data: &[u8]) -> std::io::Result<()>;
    fn subscribe_events(&mut self, enable: bool) -> std::io::Result<()>;
    /// `Ok(false)` on timeout. A negative timeout waits forever.
    fn wait_event(&mut self, timeout_ms: i32) -> std::io::Result<bool>;
    /// Next queued event, or `None` when the queue is empty.
    fn read_event(&mut self) -> std::io::Result<Option<SndCtlEvent>>;
}

/// Kernel control node (`controlC<card>`).
#[derive(Debug)]
pub struct HwControl {
    node: File,
    path: PathBuf,
}

impl HwControl {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let node = File::options()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;
        Ok(Self {
            node,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.node.as_raw_fd()
    }

    fn poll(&self, timeout_ms: i32) -> std::io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd(),
            events: libc::POLLIN | libc::POLLOUT | libc::POLLERR | libc::POLLNVAL,
            revents: 0,
        };
        loop {
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if rc == 0 {
                return Ok(false);
            }
            if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                return Err(std::io::Error::from_raw_os_error(libc::EIO));
            }
            if pfd.revents & (libc::POLLIN | libc::POLLOUT) != 0 {
                return Ok(true);
            }
        }
    }
}

impl ControlDriver for HwControl {
    fn card_info(&mut self) -> std::io::Result<SndCtlCardInfo> {
        let mut info = SndCtlCardInfo::default();
        unsafe { snd_ctl_card_info(self.fd(), &mut info) }
            .map_err(|_| std::io::Error::last_os_error())?;
        Ok(info)
    }

    fn elem_count(&mut self) -> std::io::Result<u32> {
        let mut list = SndCtlElemList::default();
        unsafe { snd_ctl_elem_list(self.fd(), &mut list) }
            .map_err(|_| std::io::Error::last_os_error())?;
        Ok(list.count)
    }

    fn elem_ids(&mut self, offset: u32, space: u32) -> std::io::Result<Vec<SndCtlElemId>> {
        let mut ids = vec![SndCtlElemId::default(); space as usize];
        let mut list = SndCtlElemList {
            offset,
            space,
            pids: ids.as_mut_ptr(),
            ..SndCtlElemList::default()
        };
        unsafe { snd_ctl_elem_list(self.fd(), &mut list) }
            .map_err(|_| std::io::Error::last_os_error())?;
        ids.truncate(list.used.min(space) as usize);
        Ok(ids)
    }

    fn elem_info(&mut self, info: &mut SndCtlElemInfo) -> std::io::Result<()> {
        unsafe { snd_ctl_elem_info(self.fd(), info) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn elem_read(&mut self, value: &mut SndCtlElemValue) -> std::io::Result<()> {
        unsafe { snd_ctl_elem_read(self.fd(), value) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn elem_write(&mut self, value: &mut SndCtlElemValue) -> std::io::Result<()> {
        unsafe { snd_ctl_elem_write(self.fd(), value) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn tlv_read(&mut self, numid: u32, data: &mut [u8]) -> std::io::Result<()> {
        let mut buf = tlv_buffer(numid, data.len());
        unsafe { snd_ctl_tlv_read(self.fd(), buf.as_mut_ptr()) }
            .map_err(|_| std::io::Error::last_os_error())?;
        let payload = tlv_payload(&buf);
        let len = payload.len().min(data.len());
        data[..len].copy_from_slice(&payload[..len]);
        Ok(())
    }

    fn tlv_write(&mut self, numid: u32, data: &[u8]) -> std::io::Result<()> {
        let mut buf = tlv_buffer(numid, data.len());
        tlv_fill(&mut buf, data);
        unsafe { snd_ctl_tlv_write(self.fd(), buf.as_mut_ptr()) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn subscribe_events(&mut self, enable: bool) -> std::io::Result<()> {
        let mut subscribe = libc::c_int::from(enable);
        unsafe { snd_ctl_subscribe_events(self.fd(), &mut subscribe) }
            .map(|_| ())
            .map_err(|_| std::io::Error::last_os_error())
    }

    fn wait_event(&mut self, timeout_ms: i32) -> std::io::Result<bool> {
        self.poll(timeout_ms)
    }

    fn read_event(&mut self) -> std::io::Result<Option<SndCtlEvent>> {
        if !self.poll(0)? {
            return Ok(None);
        }
        let mut raw = [0_u8; size_of::<SndCtlEvent>()];
        let got = self.node.read(&mut raw)?;
        if got < raw.len() {
            return Ok(None);
        }
        // SAFETY: SndCtlEvent is plain old data and `raw` holds exactly one
        // record written by the kernel.
        let event = unsafe { std::ptr::read_unaligned(raw.as_ptr().cast::<SndCtlEvent>()) };
        Ok(Some(event))
    }
}
