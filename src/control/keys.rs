//! Key identifiers: parsing configured key strings and mapping the
//! abstract navigation/media keys of the control surface onto the
//! protocol's `KEY_*` names.

/// What pressing an abstract key should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Send this protocol key.
    Send(&'static str),
    /// Accepted but deliberately does nothing (no protocol equivalent),
    /// and the fallback for identifiers not in the table.
    Ignore,
}

/// Fixed table from abstract key identifiers to protocol keys.
/// Unrecognized identifiers are silently ignored.
pub fn lookup(identifier: &str) -> KeyAction {
    match identifier {
        "rewind" => KeyAction::Send("KEY_REWIND"),
        "fast_forward" => KeyAction::Send("KEY_FF"),
        "arrow_up" => KeyAction::Send("KEY_UP"),
        "arrow_down" => KeyAction::Send("KEY_DOWN"),
        "arrow_left" => KeyAction::Send("KEY_LEFT"),
        "arrow_right" => KeyAction::Send("KEY_RIGHT"),
        "select" => KeyAction::Send("KEY_ENTER"),
        "back" => KeyAction::Send("KEY_RETURN"),
        "exit" => KeyAction::Send("KEY_EXIT"),
        "information" => KeyAction::Send("KEY_INFO"),
        // The protocol has no next-track or play/pause equivalent.
        "next_track" | "play_pause" => KeyAction::Ignore,
        _ => KeyAction::Ignore,
    }
}

/// Parse a configured key string ("hdmi2", "KEY_MENU down enter",
/// "KEY_SOURCE,KEY_ENTER") into protocol key identifiers.
pub fn parse_keys(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let upper = s.to_ascii_uppercase();
            if upper.starts_with("KEY_") {
                upper
            } else {
                format!("KEY_{upper}")
            }
        })
        .collect()
}

/// Application identifiers the TVs can launch directly. A configured
/// input whose key string matches one of these names (case-insensitive)
/// becomes an open-app source instead of a key sequence.
pub fn known_app_id(name: &str) -> Option<&'static str> {
    const APPS: &[(&str, &str)] = &[
        ("netflix", "11101200001"),
        ("youtube", "111299001912"),
        ("prime video", "3201512006785"),
        ("spotify", "3201606009684"),
        ("plex", "3201512006963"),
        ("disney+", "3201901017640"),
    ];
    let lower = name.to_ascii_lowercase();
    APPS.iter()
        .find(|(app, _)| *app == lower)
        .map(|(_, id)| *id)
}
