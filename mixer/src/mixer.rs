use crate::ctl::{Control, MixerCtl};
use crate::driver::{ControlDriver, HwControl};
use crate::error::{Error, Result};
use crate::event::{CtlEvent, EventWait};
use crate::ioctl::{SNDRV_CTL_EVENT_ELEM, SndCtlCardInfo, SndCtlElemInfo};
use pcmio::pcm::ioctl::cstr_fixed;

/// Control registry of one card.
///
/// Controls are cached in driver list order. The cache only ever grows:
/// [`Mixer::scan`] picks up controls that appeared since the last scan and
/// treats a shrinking list as an error.
pub struct Mixer {
    driver: Box<dyn ControlDriver>,
    card_info: SndCtlCardInfo,
    ctls: Vec<Control>,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("name", &self.name())
            .field("controls", &self.ctls.len())
            .finish()
    }
}

impl Mixer {
    /// Opens `controlC<card>` in the device directory and scans its controls.
    pub fn open(card: u32) -> Result<Self> {
        let path = pcmio::device::control_path(card);
        let hw = HwControl::open(&path).map_err(|source| Error::Open {
            path: path.clone(),
            source,
        })?;
        Self::open_with_driver(Box::new(hw))
    }

    pub fn open_with_driver(mut driver: Box<dyn ControlDriver>) -> Result<Self> {
        let card_info = driver
            .card_info()
            .map_err(|e| Error::driver("cannot get card info", e))?;
        let mut mixer = Self {
            driver,
            card_info,
            ctls: Vec::new(),
        };
        mixer.scan()?;
        tracing::debug!(
            "opened mixer '{}' with {} controls",
            mixer.name(),
            mixer.ctls.len()
        );
        Ok(mixer)
    }

    /// Adds controls that appeared since the last scan and returns how many
    /// were added. Only the new controls are queried. Cached controls stay
    /// valid; if fetching a new control's info fails, the ones fetched
    /// before it are kept.
    pub fn scan(&mut self) -> Result<usize> {
        let cached = self.ctls.len() as u32;
        let reported = self
            .driver
            .elem_count()
            .map_err(|e| Error::driver("cannot count controls", e))?;
        if reported == cached {
            return Ok(0);
        }
        if reported < cached {
            tracing::warn!(
                "mixer '{}' lost controls: {cached} cached, {reported} reported",
                self.name()
            );
            return Err(Error::ControlsRemoved { cached, reported });
        }

        let ids = self
            .driver
            .elem_ids(cached, reported - cached)
            .map_err(|e| Error::driver("cannot list controls", e))?;
        self.ctls.reserve(ids.len());
        for id in &ids {
            let mut info = SndCtlElemInfo::for_numid(id.numid);
            self.driver.elem_info(&mut info).map_err(|e| {
                Error::driver(format!("cannot get info for control {}", id.numid), e)
            })?;
            self.ctls.push(Control::new(info));
        }
        tracing::debug!(
            "mixer '{}' grew by {} controls to {}",
            self.name(),
            ids.len(),
            self.ctls.len()
        );
        Ok(ids.len())
    }

    /// Short card name.
    pub fn name(&self) -> String {
        cstr_fixed(&self.card_info.name)
    }

    pub fn long_name(&self) -> String {
        cstr_fixed(&self.card_info.longname)
    }

    pub fn mixer_name(&self) -> String {
        cstr_fixed(&self.card_info.mixername)
    }

    pub fn driver_name(&self) -> String {
        cstr_fixed(&self.card_info.driver)
    }

    pub fn card(&self) -> i32 {
        self.card_info.card
    }

    pub fn num_ctls(&self) -> usize {
        self.ctls.len()
    }

    pub fn num_ctls_by_name(&self, name: &str) -> usize {
        self.ctls.iter().filter(|c| c.name() == name).count()
    }

    pub fn controls(&self) -> impl Iterator<Item = &Control> + '_ {
        self.ctls.iter()
    }

    fn position(&self, name: &str, index: usize) -> Option<usize> {
        self.ctls
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name() == name)
            .nth(index)
            .map(|(n, _)| n)
    }

    pub fn ctl(&self, id: usize) -> Option<&Control> {
        self.ctls.get(id)
    }

    pub fn ctl_by_name(&self, name: &str) -> Option<&Control> {
        self.ctl_by_name_and_index(name, 0)
    }

    /// The `index`-th control called `name`, counting in list order.
    pub fn ctl_by_name_and_index(&self, name: &str, index: usize) -> Option<&Control> {
        self.position(name, index).and_then(|n| self.ctls.get(n))
    }

    pub fn ctl_mut(&mut self, id: usize) -> Option<MixerCtl<'_>> {
        let ctl = self.ctls.get_mut(id)?;
        Some(MixerCtl::new(self.driver.as_mut(), ctl))
    }

    pub fn ctl_by_name_mut(&mut self, name: &str) -> Option<MixerCtl<'_>> {
        self.ctl_by_name_and_index_mut(name, 0)
    }

    pub fn ctl_by_name_and_index_mut(
        &mut self,
        name: &str,
        index: usize,
    ) -> Option<MixerCtl<'_>> {
        let n = self.position(name, index)?;
        self.ctl_mut(n)
    }

    /// Turns change notifications on or off for this handle.
    pub fn subscribe_events(&mut self, enable: bool) -> Result<()> {
        self.driver
            .subscribe_events(enable)
            .map_err(|e| Error::driver("cannot subscribe to events", e))
    }

    /// Blocks until an event is queued or `timeout_ms` passes. A negative
    /// timeout waits forever.
    pub fn wait_event(&mut self, timeout_ms: i32) -> Result<EventWait> {
        match self.driver.wait_event(timeout_ms) {
            Ok(true) => Ok(EventWait::Ready),
            Ok(false) => Ok(EventWait::Timeout),
            Err(e) => Err(Error::driver("cannot wait for events", e)),
        }
    }

    /// Next queued element event, or `None` once the queue is drained.
    pub fn read_event(&mut self) -> Result<Option<CtlEvent>> {
        loop {
            let raw = self
                .driver
                .read_event()
                .map_err(|e| Error::driver("cannot read event", e))?;
            match raw {
                None => return Ok(None),
                Some(raw) if raw.type_ == SNDRV_CTL_EVENT_ELEM => {
                    return Ok(Some(CtlEvent::from_raw(&raw)));
                }
                Some(raw) => tracing::debug!("skipping control event of type {}", raw.type_),
            }
        }
    }
}
