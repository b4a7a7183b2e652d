use std::ffi::OsString;
use std::path::PathBuf;

pub const SND_DIR_ENV: &str = "PCMIO_SND_DIR";
pub const SYNC_PTR_ENV: &str = "PCMIO_FORCE_SYNC_PTR";
pub const DEFAULT_SND_DIR: &str = "/dev/snd";

pub fn env_flag(key: &str) -> bool {
    flag_value(std::env::var(key).ok().as_deref())
}

pub fn flag_value(value: Option<&str>) -> bool {
    value
        .map(|v| {
            let s = v.trim().to_ascii_lowercase();
            s == "1" || s == "true" || s == "yes" || s == "on"
        })
        .unwrap_or(false)
}

/// Directory holding the `pcmC*D*` and `controlC*` nodes.
pub fn snd_dir() -> PathBuf {
    snd_dir_from(std::env::var_os(SND_DIR_ENV))
}

pub fn snd_dir_from(value: Option<OsString>) -> PathBuf {
    match value {
        Some(v) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(DEFAULT_SND_DIR),
    }
}

/// Skip the status/control page mapping and always use SYNC_PTR.
pub fn force_sync_ptr() -> bool {
    env_flag(SYNC_PTR_ENV)
}
