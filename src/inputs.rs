//! Input source resolution
//!
//! Builds the ordered, selectable input list for a device. Index 0 is
//! a divider that stands for "back to live TV", index 1 is the tuner
//! itself, and everything after comes from the device's configured
//! inputs in the order given.

use std::sync::OnceLock;

use regex::Regex;

use crate::control::keys;
use crate::device::DeviceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Divider or any non-HDMI key shortcut.
    Other,
    /// The live TV tuner.
    Tuner,
    Application,
    Hdmi,
}

/// What activating a source does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// The divider has no activation of its own.
    None,
    OpenTv,
    OpenApp(String),
    SendKeys(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    pub label: String,
    pub kind: InputKind,
    pub action: InputAction,
}

/// An input is HDMI only when its whole parsed sequence is a single
/// `KEY_HDMI` key with at most one digit 0-4.
fn is_hdmi_sequence(parsed: &[String]) -> bool {
    static HDMI_KEY: OnceLock<Regex> = OnceLock::new();
    let re = HDMI_KEY.get_or_init(|| Regex::new(r"^KEY_HDMI[0-4]?$").expect("valid pattern"));
    parsed.len() == 1 && re.is_match(&parsed[0])
}

/// Build the ordered source list for a device.
pub fn resolve_inputs(device: &DeviceRecord) -> Vec<InputSource> {
    let mut sources = vec![
        InputSource {
            label: "-----".to_string(),
            kind: InputKind::Other,
            action: InputAction::None,
        },
        InputSource {
            label: "Live TV".to_string(),
            kind: InputKind::Tuner,
            action: InputAction::OpenTv,
        },
    ];

    for entry in &device.inputs {
        if let Some(app_id) = keys::known_app_id(&entry.keys) {
            sources.push(InputSource {
                label: entry.name.clone(),
                kind: InputKind::Application,
                action: InputAction::OpenApp(app_id.to_string()),
            });
            continue;
        }

        let parsed = keys::parse_keys(&entry.keys);
        let kind = if is_hdmi_sequence(&parsed) {
            InputKind::Hdmi
        } else {
            InputKind::Other
        };
        sources.push(InputSource {
            label: entry.name.clone(),
            kind,
            action: InputAction::SendKeys(parsed),
        });
    }

    sources
}
