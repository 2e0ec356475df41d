//! OS-specific directories for the config file and logs.

use std::path::PathBuf;

use crate::error::{MpError, MpResult};

const APP_DIR_NAME: &str = "MebelPlace";

/// Directory holding `config.toml`.
///
/// - Windows: `%APPDATA%/MebelPlace`
/// - macOS: `~/Library/Application Support/MebelPlace`
/// - Linux: `~/.config/MebelPlace`
pub fn config_dir() -> MpResult<PathBuf> {
    dirs::config_dir()
        .map(|base| base.join(APP_DIR_NAME))
        .ok_or_else(|| MpError::Config("could not determine config directory".into()))
}

/// Directory for application data; default log files live under `logs/`.
pub fn data_dir() -> MpResult<PathBuf> {
    dirs::data_dir()
        .map(|base| base.join(APP_DIR_NAME))
        .ok_or_else(|| MpError::Config("could not determine data directory".into()))
}
