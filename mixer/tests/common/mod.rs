#![allow(dead_code)]

use nix::libc;
use pcmio_mixer::ControlDriver;
use pcmio_mixer::ioctl::{
    SNDRV_CTL_ELEM_ACCESS_READWRITE, SNDRV_CTL_ELEM_ACCESS_TLV_READWRITE,
    SNDRV_CTL_ELEM_TYPE_BOOLEAN, SNDRV_CTL_ELEM_TYPE_BYTES, SNDRV_CTL_ELEM_TYPE_ENUMERATED,
    SNDRV_CTL_ELEM_TYPE_INTEGER, SNDRV_CTL_ELEM_TYPE_INTEGER64, SNDRV_CTL_EVENT_ELEM,
    SNDRV_CTL_EVENT_MASK_VALUE, SndCtlCardInfo, SndCtlElemId, SndCtlElemInfo, SndCtlElemValue,
    SndCtlEvent,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[derive(Debug, Clone)]
pub struct MockControl {
    pub name: String,
    pub index: u32,
    pub type_: libc::c_int,
    pub count: u32,
    pub access: u32,
    pub min: i64,
    pub max: i64,
    pub items: Vec<String>,
    pub values: Vec<i64>,
    pub bytes: Vec<u8>,
    pub tlv: Vec<u8>,
}

impl MockControl {
    fn base(name: &str, type_: libc::c_int, count: u32) -> Self {
        Self {
            name: name.to_string(),
            index: 0,
            type_,
            count,
            access: SNDRV_CTL_ELEM_ACCESS_READWRITE,
            min: 0,
            max: 0,
            items: Vec::new(),
            values: vec![0; count as usize],
            bytes: Vec::new(),
            tlv: Vec::new(),
        }
    }

    pub fn integer(name: &str, min: i64, max: i64, values: &[i64]) -> Self {
        Self {
            min,
            max,
            values: values.to_vec(),
            ..Self::base(name, SNDRV_CTL_ELEM_TYPE_INTEGER, values.len() as u32)
        }
    }

    pub fn integer64(name: &str, min: i64, max: i64, values: &[i64]) -> Self {
        Self {
            min,
            max,
            values: values.to_vec(),
            ..Self::base(name, SNDRV_CTL_ELEM_TYPE_INTEGER64, values.len() as u32)
        }
    }

    pub fn boolean(name: &str, values: &[i64]) -> Self {
        Self {
            min: 0,
            max: 1,
            values: values.to_vec(),
            ..Self::base(name, SNDRV_CTL_ELEM_TYPE_BOOLEAN, values.len() as u32)
        }
    }

    pub fn enumerated(name: &str, items: &[&str], selected: i64) -> Self {
        Self {
            items: items.iter().map(|s| s.to_string()).collect(),
            values: vec![selected],
            ..Self::base(name, SNDRV_CTL_ELEM_TYPE_ENUMERATED, 1)
        }
    }

    pub fn bytes(name: &str, bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            ..Self::base(name, SNDRV_CTL_ELEM_TYPE_BYTES, bytes.len() as u32)
        }
    }

    pub fn tlv_bytes(name: &str, count: u32) -> Self {
        Self {
            access: SNDRV_CTL_ELEM_ACCESS_READWRITE | SNDRV_CTL_ELEM_ACCESS_TLV_READWRITE,
            ..Self::base(name, SNDRV_CTL_ELEM_TYPE_BYTES, count)
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CtlCalls {
    pub elem_count: usize,
    pub elem_ids: usize,
    pub elem_info: usize,
    pub elem_read: usize,
    pub elem_write: usize,
    pub tlv_read: usize,
    pub tlv_write: usize,
}

#[derive(Debug, Default)]
pub struct CardState {
    pub controls: Vec<MockControl>,
    pub calls: CtlCalls,
    pub last_list: Option<(u32, u32)>,
    /// numid whose ELEM_INFO fails with EIO.
    pub failing_info: Option<u32>,
    pub subscribed: bool,
    pub events: VecDeque<SndCtlEvent>,
}

impl CardState {
    fn control(&self, numid: u32) -> std::io::Result<&MockControl> {
        numid
            .checked_sub(1)
            .and_then(|n| self.controls.get(n as usize))
            .ok_or_else(|| std::io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn control_mut(&mut self, numid: u32) -> std::io::Result<&mut MockControl> {
        numid
            .checked_sub(1)
            .and_then(|n| self.controls.get_mut(n as usize))
            .ok_or_else(|| std::io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn id(&self, numid: u32) -> SndCtlElemId {
        match self.control(numid) {
            Ok(ctl) => SndCtlElemId::named(numid, &ctl.name, ctl.index),
            Err(_) => SndCtlElemId::with_numid(numid),
        }
    }

    fn notify(&mut self, numid: u32) {
        if self.subscribed {
            let id = self.id(numid);
            self.events.push_back(SndCtlEvent {
                type_: SNDRV_CTL_EVENT_ELEM,
                mask: SNDRV_CTL_EVENT_MASK_VALUE,
                id,
            });
        }
    }
}

/// In-memory sound card with a typical set of controls.
#[derive(Clone)]
pub struct MockCard {
    state: Arc<Mutex<CardState>>,
}

impl MockCard {
    pub fn new(controls: Vec<MockControl>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CardState {
                controls,
                ..CardState::default()
            })),
        }
    }

    pub fn typical() -> Self {
        Self::new(vec![
            MockControl::integer("Master Playback Volume", 0, 31, &[10, 20]),
            MockControl::boolean("Master Playback Switch", &[1, 0]),
            MockControl::enumerated("Capture Source", &["Mic", "Line", "CD"], 0),
            MockControl::integer("PCM Playback Volume", -50, 50, &[0]),
            MockControl::integer("PCM Playback Volume", -50, 50, &[0]).with_index(1),
            MockControl::tlv_bytes("DSP Coefficients", 16),
            MockControl::bytes("Raw Bytes", &[1, 2, 3, 4]),
            MockControl::integer64("Sample Counter", 0, i64::MAX, &[1 << 40]),
        ])
    }

    pub fn driver(&self) -> Box<dyn ControlDriver> {
        Box::new(MockCtl {
            state: Arc::clone(&self.state),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut CardState) -> R) -> R {
        let mut state = self.state.lock().expect("mock state poisoned");
        f(&mut state)
    }

    pub fn calls(&self) -> CtlCalls {
        self.with(|s| s.calls)
    }
}

struct MockCtl {
    state: Arc<Mutex<CardState>>,
}

impl MockCtl {
    fn lock(&self) -> std::sync::MutexGuard<'_, CardState> {
        self.state.lock().expect("mock state poisoned")
    }
}

fn fill_name(dst: &mut [u8], name: &str) {
    dst.fill(0);
    let len = name.len().min(dst.len() - 1);
    dst[..len].copy_from_slice(&name.as_bytes()[..len]);
}

impl ControlDriver for MockCtl {
    fn card_info(&mut self) -> std::io::Result<SndCtlCardInfo> {
        let mut info = SndCtlCardInfo::default();
        fill_name(&mut info.id, "Mock");
        fill_name(&mut info.driver, "mock-drv");
        fill_name(&mut info.name, "Mock Card");
        fill_name(&mut info.longname, "Mock Card at mem 0x0");
        fill_name(&mut info.mixername, "Mock Codec");
        Ok(info)
    }

    fn elem_count(&mut self) -> std::io::Result<u32> {
        let mut state = self.lock();
        state.calls.elem_count += 1;
        Ok(state.controls.len() as u32)
    }

    fn elem_ids(&mut self, offset: u32, space: u32) -> std::io::Result<Vec<SndCtlElemId>> {
        let mut state = self.lock();
        state.calls.elem_ids += 1;
        state.last_list = Some((offset, space));
        let end = (offset + space).min(state.controls.len() as u32);
        Ok((offset..end).map(|n| state.id(n + 1)).collect())
    }

    fn elem_info(&mut self, info: &mut SndCtlElemInfo) -> std::io::Result<()> {
        let mut state = self.lock();
        state.calls.elem_info += 1;
        let numid = info.id.numid;
        if state.failing_info == Some(numid) {
            return Err(std::io::Error::from_raw_os_error(libc::EIO));
        }
        let id = state.id(numid);
        let ctl = state.control(numid)?;
        let item = info.enum_item();
        info.id = id;
        info.type_ = ctl.type_;
        info.access = ctl.access;
        info.count = ctl.count;
        match ctl.type_ {
            SNDRV_CTL_ELEM_TYPE_INTEGER
            | SNDRV_CTL_ELEM_TYPE_INTEGER64
            | SNDRV_CTL_ELEM_TYPE_BOOLEAN => info.set_integer_range(ctl.min, ctl.max, 1),
            SNDRV_CTL_ELEM_TYPE_ENUMERATED => {
                info.set_enum_items(ctl.items.len() as u32);
                let Some(name) = ctl.items.get(item as usize) else {
                    return Err(std::io::Error::from_raw_os_error(libc::EINVAL));
                };
                info.set_enum_name(name);
            }
            _ => {}
        }
        Ok(())
    }

    fn elem_read(&mut self, value: &mut SndCtlElemValue) -> std::io::Result<()> {
        let mut state = self.lock();
        state.calls.elem_read += 1;
        let ctl = state.control(value.id.numid)?;
        match ctl.type_ {
            SNDRV_CTL_ELEM_TYPE_INTEGER | SNDRV_CTL_ELEM_TYPE_BOOLEAN => {
                for (n, v) in ctl.values.iter().enumerate() {
                    value.set_integer(n, *v);
                }
            }
            SNDRV_CTL_ELEM_TYPE_INTEGER64 => {
                for (n, v) in ctl.values.iter().enumerate() {
                    value.set_integer64(n, *v);
                }
            }
            SNDRV_CTL_ELEM_TYPE_ENUMERATED => {
                for (n, v) in ctl.values.iter().enumerate() {
                    value.set_enum_item(n, *v as u32);
                }
            }
            SNDRV_CTL_ELEM_TYPE_BYTES => {
                value.bytes_mut()[..ctl.bytes.len()].copy_from_slice(&ctl.bytes);
            }
            _ => return Err(std::io::Error::from_raw_os_error(libc::EINVAL)),
        }
        Ok(())
    }

    fn elem_write(&mut self, value: &mut SndCtlElemValue) -> std::io::Result<()> {
        let mut state = self.lock();
        state.calls.elem_write += 1;
        let numid = value.id.numid;
        let ctl = state.control_mut(numid)?;
        match ctl.type_ {
            SNDRV_CTL_ELEM_TYPE_INTEGER | SNDRV_CTL_ELEM_TYPE_BOOLEAN => {
                for (n, v) in ctl.values.iter_mut().enumerate() {
                    *v = value.integer(n);
                }
            }
            SNDRV_CTL_ELEM_TYPE_INTEGER64 => {
                for (n, v) in ctl.values.iter_mut().enumerate() {
                    *v = value.integer64(n);
                }
            }
            SNDRV_CTL_ELEM_TYPE_ENUMERATED => {
                for (n, v) in ctl.values.iter_mut().enumerate() {
                    *v = i64::from(value.enum_item(n));
                }
            }
            SNDRV_CTL_ELEM_TYPE_BYTES => {
                let len = ctl.bytes.len();
                ctl.bytes.copy_from_slice(&value.bytes()[..len]);
            }
            _ => return Err(std::io::Error::from_raw_os_error(libc::EINVAL)),
        }
        state.notify(numid);
        Ok(())
    }

    fn tlv_read(&mut self, numid: u32, data: &mut [u8]) -> std::io::Result<()> {
        let mut state = self.lock();
        state.calls.tlv_read += 1;
        let ctl = state.control(numid)?;
        data.fill(0);
        let len = ctl.tlv.len().min(data.len());
        data[..len].copy_from_slice(&ctl.tlv[..len]);
        Ok(())
    }

    fn tlv_write(&mut self, numid: u32, data: &[u8]) -> std::io::Result<()> {
        let mut state = self.lock();
        state.calls.tlv_write += 1;
        state.control_mut(numid)?.tlv = data.to_vec();
        Ok(())
    }

    fn subscribe_events(&mut self, enable: bool) -> std::io::Result<()> {
        self.lock().subscribed = enable;
        Ok(())
    }

    fn wait_event(&mut self, _timeout_ms: i32) -> std::io::Result<bool> {
        Ok(!self.lock().events.is_empty())
    }

    fn read_event(&mut self) -> std::io::Result<Option<SndCtlEvent>> {
        Ok(self.lock().events.pop_front())
    }
}
