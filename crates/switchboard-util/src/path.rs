//! Path utilities.

use std::path::PathBuf;

const APP_DIR: &str = "switchboard";

/// Get the switchboard configuration directory.
///
/// - `$XDG_CONFIG_HOME/switchboard` if set
/// - `~/.config/switchboard` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Get the switchboard data directory, where workspace records live.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join(APP_DIR))
}

/// Default location of the gateway config file.
pub fn default_config_file() -> Option<PathBuf> {
    config_dir().map(|p| p.join("config.json"))
}
