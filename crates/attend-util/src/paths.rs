//! Default paths for attendd
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/attendd/config.toml` or `~/.config/attendd/config.toml`
//! - Data: `$XDG_DATA_HOME/attendd` or `~/.local/share/attendd`

use std::path::PathBuf;

/// Environment variable for overriding the config file
pub const ATTEND_CONFIG_ENV: &str = "ATTEND_CONFIG";

/// Environment variable for overriding the data directory
pub const ATTEND_DATA_DIR_ENV: &str = "ATTEND_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "attendd";

const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/attendd/config.toml` (if XDG_CONFIG_HOME is set)
/// 2. `~/.config/attendd/config.toml`
/// 3. `/etc/attendd/config.toml` (no home directory)
///
/// `$ATTEND_CONFIG` is honoured by the CLI layer, not here.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$ATTEND_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/attendd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/attendd` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ATTEND_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking ATTEND_DATA_DIR.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}
