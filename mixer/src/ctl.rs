//! Cached control metadata and the value handle used to read and write a
//! control through its mixer.

use crate::driver::ControlDriver;
use crate::error::{Error, Result};
use crate::ioctl::{
    MAX_BYTE_VALUES, MAX_ENUM_VALUES, MAX_INTEGER_VALUES, MAX_INTEGER64_VALUES,
    SNDRV_CTL_ELEM_ACCESS_TLV_READWRITE, SNDRV_CTL_ELEM_TYPE_BOOLEAN, SNDRV_CTL_ELEM_TYPE_BYTES,
    SNDRV_CTL_ELEM_TYPE_ENUMERATED, SNDRV_CTL_ELEM_TYPE_IEC958, SNDRV_CTL_ELEM_TYPE_INTEGER,
    SNDRV_CTL_ELEM_TYPE_INTEGER64, SndCtlElemInfo, SndCtlElemValue, TLV_HEADER_SIZE,
};
use nix::libc;
use pcmio::pcm::ioctl::cstr_fixed;
use std::ops::Deref;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CtlType {
    Bool,
    Int,
    Enum,
    Byte,
    Iec958,
    Int64,
    Unknown,
}

impl CtlType {
    pub fn from_raw(raw: libc::c_int) -> Self {
        match raw {
            SNDRV_CTL_ELEM_TYPE_BOOLEAN => Self::Bool,
            SNDRV_CTL_ELEM_TYPE_INTEGER => Self::Int,
            SNDRV_CTL_ELEM_TYPE_ENUMERATED => Self::Enum,
            SNDRV_CTL_ELEM_TYPE_BYTES => Self::Byte,
            SNDRV_CTL_ELEM_TYPE_IEC958 => Self::Iec958,
            SNDRV_CTL_ELEM_TYPE_INTEGER64 => Self::Int64,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Int => "INT",
            Self::Enum => "ENUM",
            Self::Byte => "BYTE",
            Self::Iec958 => "IEC958",
            Self::Int64 => "INT64",
            Self::Unknown => "Unknown",
        }
    }

    /// How many values of this type fit in one value record.
    fn capacity(self) -> usize {
        match self {
            Self::Bool | Self::Int => MAX_INTEGER_VALUES,
            Self::Int64 => MAX_INTEGER64_VALUES,
            Self::Enum => MAX_ENUM_VALUES,
            Self::Byte => MAX_BYTE_VALUES,
            Self::Iec958 | Self::Unknown => 0,
        }
    }
}

impl std::fmt::Display for CtlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the control registry.
#[derive(Debug, Clone)]
pub struct Control {
    info: SndCtlElemInfo,
    name: String,
    enum_names: Option<Vec<String>>,
}

impl Control {
    pub(crate) fn new(info: SndCtlElemInfo) -> Self {
        Self {
            name: cstr_fixed(&info.id.name),
            info,
            enum_names: None,
        }
    }

    /// 0-based id, valid for [`crate::Mixer::ctl`].
    pub fn id(&self) -> u32 {
        self.info.id.numid.saturating_sub(1)
    }

    pub fn numid(&self) -> u32 {
        self.info.id.numid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element index, distinguishing controls that share a name.
    pub fn index(&self) -> u32 {
        self.info.id.index
    }

    pub fn ctl_type(&self) -> CtlType {
        CtlType::from_raw(self.info.type_)
    }

    pub fn type_string(&self) -> &'static str {
        self.ctl_type().as_str()
    }

    pub fn num_values(&self) -> u32 {
        self.info.count
    }

    fn is_integer(&self) -> bool {
        matches!(self.ctl_type(), CtlType::Int | CtlType::Int64)
    }

    pub fn range_min(&self) -> Option<i64> {
        self.is_integer().then(|| self.info.integer_min())
    }

    pub fn range_max(&self) -> Option<i64> {
        self.is_integer().then(|| self.info.integer_max())
    }

    pub fn step(&self) -> Option<i64> {
        self.is_integer().then(|| self.info.integer_step())
    }

    pub fn num_enums(&self) -> u32 {
        match self.ctl_type() {
            CtlType::Enum => self.info.enum_items(),
            _ => 0,
        }
    }

    pub fn is_access_tlv_rw(&self) -> bool {
        self.info.access & SNDRV_CTL_ELEM_ACCESS_TLV_READWRITE != 0
    }

    /// Enumerated item names, once something has asked for them.
    pub fn enum_names(&self) -> Option<&[String]> {
        self.enum_names.as_deref()
    }

    pub fn info(&self) -> &SndCtlElemInfo {
        &self.info
    }
}

/// A control borrowed together with the driver it lives on.
pub struct MixerCtl<'a> {
    driver: &'a mut dyn ControlDriver,
    ctl: &'a mut Control,
}

impl Deref for MixerCtl<'_> {
    type Target = Control;

    fn deref(&self) -> &Control {
        self.ctl
    }
}

impl std::fmt::Debug for MixerCtl<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerCtl").field("ctl", &self.ctl).finish()
    }
}

impl<'a> MixerCtl<'a> {
    pub(crate) fn new(driver: &'a mut dyn ControlDriver, ctl: &'a mut Control) -> Self {
        Self { driver, ctl }
    }

    fn read(&mut self) -> Result<SndCtlElemValue> {
        let mut value = SndCtlElemValue::for_numid(self.ctl.numid());
        self.driver
            .elem_read(&mut value)
            .map_err(|e| Error::driver(format!("cannot read control '{}'", self.ctl.name), e))?;
        Ok(value)
    }

    fn write(&mut self, value: &mut SndCtlElemValue) -> Result<()> {
        self.driver
            .elem_write(value)
            .map_err(|e| Error::driver(format!("cannot write control '{}'", self.ctl.name), e))
    }

    fn unsupported(&self, what: &str) -> Error {
        Error::invalid(format!(
            "{what} not supported on {} control '{}'",
            self.ctl.type_string(),
            self.ctl.name
        ))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let limit = (self.ctl.num_values() as usize).min(self.ctl.ctl_type().capacity());
        if index >= limit {
            return Err(Error::invalid(format!(
                "value index {index} out of range for '{}' ({limit} values)",
                self.ctl.name
            )));
        }
        Ok(())
    }

    fn check_count(&self, count: usize, limit: usize) -> Result<()> {
        if count == 0 || count > limit {
            return Err(Error::invalid(format!(
                "{count} values requested from '{}', expected 1..={limit}",
                self.ctl.name
            )));
        }
        Ok(())
    }

    fn check_range(&self, value: i64) -> Result<()> {
        let (min, max) = (self.ctl.info.integer_min(), self.ctl.info.integer_max());
        if value < min || value > max {
            return Err(Error::invalid(format!(
                "{value} outside {min}..={max} for '{}'",
                self.ctl.name
            )));
        }
        Ok(())
    }

    /// Value `index` of the control. Booleans read as 0 or 1.
    pub fn get_value(&mut self, index: u32) -> Result<i64> {
        let kind = self.ctl.ctl_type();
        if matches!(kind, CtlType::Iec958 | CtlType::Unknown) {
            return Err(self.unsupported("value access"));
        }
        let index = index as usize;
        self.check_index(index)?;
        let value = self.read()?;
        Ok(match kind {
            CtlType::Bool => i64::from(value.integer(index) != 0),
            CtlType::Int => value.integer(index),
            CtlType::Int64 => value.integer64(index),
            CtlType::Enum => i64::from(value.enum_item(index)),
            CtlType::Byte => i64::from(value.bytes()[index]),
            CtlType::Iec958 | CtlType::Unknown => return Err(self.unsupported("value access")),
        })
    }

    /// Sets value `index`, leaving the other values of the control as the
    /// driver reports them.
    pub fn set_value(&mut self, index: u32, value: i64) -> Result<()> {
        let kind = self.ctl.ctl_type();
        if matches!(kind, CtlType::Iec958 | CtlType::Unknown) {
            return Err(self.unsupported("value access"));
        }
        let index = index as usize;
        self.check_index(index)?;
        match kind {
            CtlType::Int | CtlType::Int64 => self.check_range(value)?,
            CtlType::Enum if value < 0 || value >= i64::from(self.ctl.info.enum_items()) => {
                return Err(Error::invalid(format!(
                    "item {value} out of range for '{}' ({} items)",
                    self.ctl.name,
                    self.ctl.info.enum_items()
                )));
            }
            CtlType::Byte if u8::try_from(value).is_err() => {
                return Err(Error::invalid(format!(
                    "{value} is not a byte value for '{}'",
                    self.ctl.name
                )));
            }
            _ => {}
        }

        let mut record = self.read()?;
        match kind {
            CtlType::Bool => record.set_integer(index, i64::from(value != 0)),
            CtlType::Int => record.set_integer(index, value),
            CtlType::Int64 => record.set_integer64(index, value),
            CtlType::Enum => record.set_enum_item(index, value as u32),
            CtlType::Byte => record.bytes_mut()[index] = value as u8,
            CtlType::Iec958 | CtlType::Unknown => return Err(self.unsupported("value access")),
        }
        self.write(&mut record)
    }

    /// Fills `values` with the first `values.len()` values of a boolean or
    /// integer control.
    pub fn get_array(&mut self, values: &mut [i64]) -> Result<()> {
        let kind = self.ctl.ctl_type();
        if !matches!(kind, CtlType::Bool | CtlType::Int | CtlType::Int64) {
            return Err(self.unsupported("integer array access"));
        }
        let limit = (self.ctl.num_values() as usize).min(kind.capacity());
        self.check_count(values.len(), limit)?;
        let record = self.read()?;
        for (index, slot) in values.iter_mut().enumerate() {
            *slot = match kind {
                CtlType::Int64 => record.integer64(index),
                _ => record.integer(index),
            };
        }
        Ok(())
    }

    /// Overwrites the first `values.len()` values of a boolean or integer
    /// control. Integer values are range checked before anything is sent.
    pub fn set_array(&mut self, values: &[i64]) -> Result<()> {
        let kind = self.ctl.ctl_type();
        if !matches!(kind, CtlType::Bool | CtlType::Int | CtlType::Int64) {
            return Err(self.unsupported("integer array access"));
        }
        let limit = (self.ctl.num_values() as usize).min(kind.capacity());
        self.check_count(values.len(), limit)?;
        if kind != CtlType::Bool {
            for value in values {
                self.check_range(*value)?;
            }
        }
        let mut record = self.read()?;
        for (index, value) in values.iter().enumerate() {
            match kind {
                CtlType::Int64 => record.set_integer64(index, *value),
                _ => record.set_integer(index, *value),
            }
        }
        self.write(&mut record)
    }

    /// Longest byte transfer the control accepts. TLV controls get room for
    /// the TLV header on top of the element count.
    pub fn max_bytes(&self) -> usize {
        let count = self.ctl.num_values() as usize;
        if self.ctl.is_access_tlv_rw() {
            count + TLV_HEADER_SIZE
        } else {
            count.min(MAX_BYTE_VALUES)
        }
    }

    /// Reads `data.len()` bytes from a byte control, through a TLV transfer
    /// when the control is TLV read/write.
    pub fn get_bytes(&mut self, data: &mut [u8]) -> Result<()> {
        if self.ctl.ctl_type() != CtlType::Byte {
            return Err(self.unsupported("byte access"));
        }
        self.check_count(data.len(), self.max_bytes())?;
        if self.ctl.is_access_tlv_rw() {
            let numid = self.ctl.numid();
            return self
                .driver
                .tlv_read(numid, data)
                .map_err(|e| Error::driver(format!("cannot read TLV of '{}'", self.ctl.name), e));
        }
        let record = self.read()?;
        data.copy_from_slice(&record.bytes()[..data.len()]);
        Ok(())
    }

    pub fn set_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.ctl.ctl_type() != CtlType::Byte {
            return Err(self.unsupported("byte access"));
        }
        self.check_count(data.len(), self.max_bytes())?;
        if self.ctl.is_access_tlv_rw() {
            let numid = self.ctl.numid();
            return self
                .driver
                .tlv_write(numid, data)
                .map_err(|e| Error::driver(format!("cannot write TLV of '{}'", self.ctl.name), e));
        }
        let mut record = self.read()?;
        record.bytes_mut()[..data.len()].copy_from_slice(data);
        self.write(&mut record)
    }

    /// Value `index` as a percentage of the control's range.
    pub fn get_percent(&mut self, index: u32) -> Result<i32> {
        if !self.ctl.is_integer() {
            return Err(self.unsupported("percent access"));
        }
        let min = i128::from(self.ctl.info.integer_min());
        let range = i128::from(self.ctl.info.integer_max()) - min;
        let value = i128::from(self.get_value(index)?);
        if range == 0 {
            return Ok(0);
        }
        Ok(((value - min) * 100 / range) as i32)
    }

    pub fn set_percent(&mut self, index: u32, percent: i32) -> Result<()> {
        if !self.ctl.is_integer() {
            return Err(self.unsupported("percent access"));
        }
        if !(0..=100).contains(&percent) {
            return Err(Error::invalid(format!("percent {percent} outside 0..=100")));
        }
        let min = i128::from(self.ctl.info.integer_min());
        let range = i128::from(self.ctl.info.integer_max()) - min;
        let value = min + range * i128::from(percent) / 100;
        self.set_value(index, value as i64)
    }

    fn fill_enum_names(&mut self) -> Result<()> {
        if self.ctl.enum_names.is_some() {
            return Ok(());
        }
        let items = self.ctl.info.enum_items();
        let mut names = Vec::with_capacity(items as usize);
        for item in 0..items {
            let mut info = SndCtlElemInfo::for_numid(self.ctl.numid());
            info.set_enum_item(item);
            self.driver.elem_info(&mut info).map_err(|e| {
                Error::driver(
                    format!("cannot get item {item} of '{}'", self.ctl.name),
                    e,
                )
            })?;
            names.push(info.enum_name());
        }
        tracing::debug!("resolved {items} item names for '{}'", self.ctl.name);
        self.ctl.enum_names = Some(names);
        Ok(())
    }

    /// Name of enumerated item `item`. Names are fetched from the driver on
    /// first use and cached on the control.
    pub fn enum_string(&mut self, item: u32) -> Result<&str> {
        if self.ctl.ctl_type() != CtlType::Enum {
            return Err(self.unsupported("enumerated item names"));
        }
        if item >= self.ctl.info.enum_items() {
            return Err(Error::invalid(format!(
                "item {item} out of range for '{}'",
                self.ctl.name
            )));
        }
        self.fill_enum_names()?;
        self.ctl
            .enum_names
            .as_ref()
            .and_then(|names| names.get(item as usize))
            .map(String::as_str)
            .ok_or_else(|| Error::invalid(format!("item {item} has no name")))
    }

    /// Selects the item called `name` on the first value of an enumerated
    /// control.
    pub fn set_enum_by_string(&mut self, name: &str) -> Result<()> {
        if self.ctl.ctl_type() != CtlType::Enum {
            return Err(self.unsupported("enumerated item names"));
        }
        self.fill_enum_names()?;
        let position = self
            .ctl
            .enum_names
            .as_ref()
            .and_then(|names| names.iter().position(|n| n == name));
        let Some(position) = position else {
            return Err(Error::invalid(format!(
                "'{name}' is not an item of '{}'",
                self.ctl.name
            )));
        };
        let mut record = self.read()?;
        record.set_enum_item(0, position as u32);
        self.write(&mut record)
    }

    /// Refreshes the cached info from the driver. Item names are resolved
    /// again on next use.
    pub fn update(&mut self) -> Result<()> {
        let mut info = SndCtlElemInfo::for_numid(self.ctl.numid());
        self.driver
            .elem_info(&mut info)
            .map_err(|e| Error::driver(format!("cannot update '{}'", self.ctl.name), e))?;
        *self.ctl = Control::new(info);
        Ok(())
    }
}
