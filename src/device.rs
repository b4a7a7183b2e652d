//! Device node naming and capability queries that do not need a stream.

use crate::config;
use crate::error::{Error, Result};
use crate::pcm::driver::{HwPcm, PcmDriver};
use crate::pcm::ioctl::SndMask;
use crate::pcm::options::{Direction, PcmFlags};
use crate::pcm::params::{HwParamSet, PcmParam};
use std::path::{Path, PathBuf};

pub fn pcm_node_name(card: u32, device: u32, direction: Direction) -> String {
    format!("pcmC{card}D{device}{}", direction.suffix())
}

pub fn pcm_path(card: u32, device: u32, direction: Direction) -> PathBuf {
    config::snd_dir().join(pcm_node_name(card, device, direction))
}

pub fn control_path(card: u32) -> PathBuf {
    config::snd_dir().join(format!("controlC{card}"))
}

/// Parses `hw:<card>,<device>`; the device defaults to 0.
pub fn parse_name(name: &str) -> Result<(u32, u32)> {
    let invalid = || Error::InvalidArgument(format!("invalid pcm name '{name}'"));
    let rest = name.trim().strip_prefix("hw:").ok_or_else(invalid)?;
    let (card, device) = match rest.split_once(',') {
        Some((card, device)) => (card, device),
        None => (rest, "0"),
    };
    let card = card.trim().parse().map_err(|_| invalid())?;
    let device = device.trim().parse().map_err(|_| invalid())?;
    Ok((card, device))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmNode {
    pub card: u32,
    pub device: u32,
    pub direction: Direction,
    pub path: PathBuf,
}

/// Splits `pcmC<card>D<device><p|c>` into its parts.
pub fn parse_node_name(name: &str) -> Option<(u32, u32, Direction)> {
    let rest = name.strip_prefix("pcmC")?;
    let (card, rest) = rest.split_once('D')?;
    let direction = match rest.chars().last()? {
        'p' => Direction::Playback,
        'c' => Direction::Capture,
        _ => return None,
    };
    let device = &rest[..rest.len() - 1];
    Some((card.parse().ok()?, device.parse().ok()?, direction))
}

/// PCM nodes present in the device directory, ordered by card, device and
/// direction.
pub fn list_pcm_nodes() -> std::io::Result<Vec<PcmNode>> {
    list_pcm_nodes_in(&config::snd_dir())
}

pub fn list_pcm_nodes_in(dir: &Path) -> std::io::Result<Vec<PcmNode>> {
    let mut nodes = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some((card, device, direction)) = name.to_str().and_then(parse_node_name) else {
            continue;
        };
        nodes.push(PcmNode {
            card,
            device,
            direction,
            path: entry.path(),
        });
    }
    nodes.sort_by_key(|n| (n.card, n.device, n.direction == Direction::Capture));
    Ok(nodes)
}

/// Everything the device can do, or `None` if it cannot be opened or
/// refuses the query.
pub fn get_params(card: u32, device: u32, direction: Direction) -> Option<HwParamSet> {
    let flags = match direction {
        Direction::Playback => PcmFlags::NONBLOCK,
        Direction::Capture => PcmFlags::NONBLOCK | PcmFlags::IN,
    };
    let path = pcm_path(card, device, direction);
    let mut hw = match HwPcm::open(&path, flags) {
        Ok(hw) => hw,
        Err(e) => {
            tracing::debug!("cannot open '{}': {e}", path.display());
            return None;
        }
    };
    get_params_with(&mut hw)
}

pub fn get_params_with(driver: &mut dyn PcmDriver) -> Option<HwParamSet> {
    match HwParamSet::query_capabilities(driver) {
        Ok(params) => Some(params),
        Err(e) => {
            tracing::debug!("hw refine failed: {e}");
            None
        }
    }
}

/// Mask of a mask-type parameter; `None` for missing params or interval
/// parameters.
pub fn get_mask(params: Option<&HwParamSet>, param: PcmParam) -> Option<&SndMask> {
    params?.mask(param)
}

/// Lower bound of an interval parameter; 0 for missing params or mask
/// parameters.
pub fn get_min(params: Option<&HwParamSet>, param: PcmParam) -> u32 {
    params.map_or(0, |p| p.min(param))
}

pub fn get_max(params: Option<&HwParamSet>, param: PcmParam) -> u32 {
    params.map_or(0, |p| p.max(param))
}
