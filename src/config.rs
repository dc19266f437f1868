//! Configuration management
//!
//! Settings layer defaults, an optional config file in the platform
//! config directory, and `TVB_*` environment overrides. Device entries
//! are accepted as-is; the registry overlays them onto discovered and
//! persisted records by usn.

use anyhow::Result;
use serde::Deserialize;

use crate::device::DeviceConfig;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Per-device user configuration, keyed by usn inside each entry.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Coarse re-discovery period in seconds.
    #[serde(default = "default_refresh_secs")]
    pub refresh_interval_secs: u64,

    /// Per-device reachability poll period in seconds.
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,
}

fn default_refresh_secs() -> u64 {
    300
}

fn default_poll_secs() -> u64 {
    15
}

/// Get config directory (TVB_CONFIG_DIR or platform default)
pub fn get_config_dir() -> std::path::PathBuf {
    if let Ok(dir) = std::env::var("TVB_CONFIG_DIR") {
        return std::path::PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return std::path::PathBuf::from(home)
                .join("Library/Application Support/tv-control-bridge");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return std::path::PathBuf::from(xdg).join("tv-control-bridge");
        }
        if let Ok(home) = std::env::var("HOME") {
            return std::path::PathBuf::from(home).join(".config/tv-control-bridge");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return std::path::PathBuf::from(appdata).join("tv-control-bridge");
        }
    }

    std::path::PathBuf::from(".")
}

/// Get data directory for the persisted device store
/// (TVB_DATA_DIR or platform default)
pub fn get_data_dir() -> std::path::PathBuf {
    if let Ok(dir) = std::env::var("TVB_DATA_DIR") {
        return std::path::PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return std::path::PathBuf::from(home)
                .join("Library/Application Support/tv-control-bridge");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return std::path::PathBuf::from(xdg).join("tv-control-bridge");
        }
        if let Ok(home) = std::env::var("HOME") {
            return std::path::PathBuf::from(home).join(".local/share/tv-control-bridge");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("LOCALAPPDATA") {
            return std::path::PathBuf::from(appdata).join("tv-control-bridge");
        }
    }

    std::path::PathBuf::from("./data")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let builder = ::config::Config::builder()
        .set_default("refresh_interval_secs", 300)?
        .set_default("poll_interval_secs", 15)?
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        .add_source(
            ::config::Environment::with_prefix("TVB")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}
