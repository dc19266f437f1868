//! Device records - the canonical description of one controllable TV
//!
//! A record is merged from three sources on every reconciliation pass:
//! live SSDP discovery, the persisted device store, and user
//! configuration. `usn` is the primary key across all three.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Default inter-command pacing in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 500;

/// User-configured input source entry: a label plus either a known
/// application name or a key sequence string ("KEY_HDMI2", "hdmi2 enter").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEntry {
    pub name: String,
    pub keys: String,
}

/// Canonical record for one television.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique stable network identifier; primary merge key.
    pub usn: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Discovery descriptor URL from the most recent pass that saw the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Override for the TV's TCP remote-control port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_control_port: Option<u16>,
    /// Pairing credential; absent until pairing succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Inter-command pacing in milliseconds.
    #[serde(default = "default_delay")]
    pub delay: u64,
    /// Excluded from control-point registration and automatic pairing,
    /// but still reconciled and persisted.
    #[serde(default)]
    pub ignore: bool,
    /// Ordered user-defined input sources.
    #[serde(default)]
    pub inputs: Vec<InputEntry>,
    /// Suppress setter capabilities even when discovery reports them.
    #[serde(default)]
    pub disable_upnp_setters: bool,
    /// True only while the current reconciliation pass saw the device.
    /// Not authoritative across restarts, so never persisted.
    #[serde(skip)]
    pub discovered: bool,
    /// Capability names reported by discovery. Absent means
    /// "nothing known", treated everywhere as the empty set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<BTreeSet<String>>,
    /// Stamped the first time discovery sees the usn, never refreshed.
    /// Reconciling identical passes must persist identical records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_delay() -> u64 {
    DEFAULT_DELAY_MS
}

impl DeviceRecord {
    /// Fresh record for a usn seen for the first time.
    pub fn new(usn: impl Into<String>) -> Self {
        Self {
            usn: usn.into(),
            name: String::new(),
            model_name: None,
            last_known_location: None,
            last_known_ip: None,
            mac: None,
            remote_control_port: None,
            token: None,
            delay: DEFAULT_DELAY_MS,
            ignore: false,
            inputs: Vec::new(),
            disable_upnp_setters: false,
            discovered: false,
            capabilities: None,
            first_seen: None,
        }
    }

    /// Whether discovery reported the named capability for this device.
    ///
    /// Setter-style names (`Set*`) report false when the user disabled
    /// UPnP setters for the device. Unknown names report false rather
    /// than erroring.
    pub fn has_capability(&self, name: &str) -> bool {
        if self.disable_upnp_setters && name.starts_with("Set") {
            return false;
        }
        self.capabilities
            .as_ref()
            .map(|caps| caps.contains(name))
            .unwrap_or(false)
    }
}

/// Raw descriptor yielded by one discovery pass, before merging.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub usn: String,
    pub name: String,
    pub model_name: Option<String>,
    pub location: String,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub capabilities: Option<BTreeSet<String>>,
}

/// Per-device user configuration; every field optional so the overlay
/// only overwrites what the user actually set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    pub usn: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub last_known_ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub remote_control_port: Option<u16>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub delay: Option<u64>,
    #[serde(default)]
    pub ignore: Option<bool>,
    #[serde(default)]
    pub inputs: Option<Vec<InputEntry>>,
    #[serde(default)]
    pub disable_upnp_setters: Option<bool>,
}
