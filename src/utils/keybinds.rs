//! Key name validation and hotkey code mapping

use global_hotkey::hotkey::{Code, HotKey};
use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::utils::settings::{ConfigError, KeySettings};

/// Named keys accepted in addition to single letters and digits
static SPECIAL_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
        "ESC", "ESCAPE", "ENTER", "RETURN", "SPACE", "TAB", "BACKSPACE",
        "UP", "DOWN", "LEFT", "RIGHT",
        "SHIFT", "CTRL", "CONTROL", "ALT",
    ]
    .into_iter()
    .collect()
});

/// Normalise a key name, `None` when it is not a supported key
pub fn resolve_key(key_name: &str) -> Option<String> {
    let key_upper = key_name.trim().to_uppercase();
    if key_upper.is_empty() {
        return None;
    }
    if SPECIAL_KEYS.contains(key_upper.as_str()) {
        return Some(key_upper);
    }

    let mut chars = key_upper.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(key_upper),
        _ => None,
    }
}

/// Check every configured binding resolves and the toggles differ
pub fn check_bindings(keys: &KeySettings) -> Result<(), ConfigError> {
    let bindings: [(&'static str, &str); 7] = [
        ("keys.start_key", &keys.start_key),
        ("keys.stop_key", &keys.stop_key),
        ("keys.cast_key", &keys.cast_key),
        ("keys.strike_key", &keys.strike_key),
        ("keys.confirm_key", &keys.confirm_key),
        ("keys.left_key", &keys.left_key),
        ("keys.right_key", &keys.right_key),
    ];
    for (name, value) in bindings {
        if resolve_key(value).is_none() {
            return Err(ConfigError::Invalid {
                name,
                reason: format!("unknown key '{}'", value),
            });
        }
    }
    for &(name, value) in &bindings[..2] {
        if string_to_code(value).is_none() {
            return Err(ConfigError::Invalid {
                name,
                reason: format!("'{}' cannot be registered as a hotkey", value),
            });
        }
    }
    if resolve_key(&keys.start_key) == resolve_key(&keys.stop_key) {
        return Err(ConfigError::Invalid {
            name: "keys.stop_key",
            reason: "start and stop keys must differ".to_string(),
        });
    }
    if resolve_key(&keys.left_key) == resolve_key(&keys.right_key) {
        return Err(ConfigError::Invalid {
            name: "keys.right_key",
            reason: "left and right keys must differ".to_string(),
        });
    }
    Ok(())
}

/// Global hotkey for a key name without modifiers
pub fn hotkey_for(key: &str) -> Option<HotKey> {
    string_to_code(key).map(|code| HotKey::new(None, code))
}

/// Convert key string to global_hotkey Code
pub fn string_to_code(key: &str) -> Option<Code> {
    let key_upper = key.trim().to_uppercase();
    let code = match key_upper.as_str() {
        "A" => Code::KeyA,
        "B" => Code::KeyB,
        "C" => Code::KeyC,
        "D" => Code::KeyD,
        "E" => Code::KeyE,
        "F" => Code::KeyF,
        "G" => Code::KeyG,
        "H" => Code::KeyH,
        "I" => Code::KeyI,
        "J" => Code::KeyJ,
        "K" => Code::KeyK,
        "L" => Code::KeyL,
        "M" => Code::KeyM,
        "N" => Code::KeyN,
        "O" => Code::KeyO,
        "P" => Code::KeyP,
        "Q" => Code::KeyQ,
        "R" => Code::KeyR,
        "S" => Code::KeyS,
        "T" => Code::KeyT,
        "U" => Code::KeyU,
        "V" => Code::KeyV,
        "W" => Code::KeyW,
        "X" => Code::KeyX,
        "Y" => Code::KeyY,
        "Z" => Code::KeyZ,
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,
        "F1" => Code::F1,
        "F2" => Code::F2,
        "F3" => Code::F3,
        "F4" => Code::F4,
        "F5" => Code::F5,
        "F6" => Code::F6,
        "F7" => Code::F7,
        "F8" => Code::F8,
        "F9" => Code::F9,
        "F10" => Code::F10,
        "F11" => Code::F11,
        "F12" => Code::F12,
        "ESC" | "ESCAPE" => Code::Escape,
        "ENTER" | "RETURN" => Code::Enter,
        "SPACE" => Code::Space,
        "TAB" => Code::Tab,
        "BACKSPACE" => Code::Backspace,
        "UP" => Code::ArrowUp,
        "DOWN" => Code::ArrowDown,
        "LEFT" => Code::ArrowLeft,
        "RIGHT" => Code::ArrowRight,
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_key() {
        assert_eq!(resolve_key("F9"), Some("F9".to_string()));
        assert_eq!(resolve_key(" a "), Some("A".to_string()));
        assert_eq!(resolve_key("space"), Some("SPACE".to_string()));
        assert_eq!(resolve_key(""), None);
        assert_eq!(resolve_key("AB"), None);
        assert_eq!(resolve_key("é"), None);
    }

    #[test]
    fn test_default_bindings_valid() {
        assert!(check_bindings(&KeySettings::default()).is_ok());
    }

    #[test]
    fn test_clashing_direction_keys_rejected() {
        let keys = KeySettings {
            right_key: "a".to_string(),
            ..KeySettings::default()
        };
        assert!(matches!(
            check_bindings(&keys),
            Err(ConfigError::Invalid { name: "keys.right_key", .. })
        ));
    }

    #[test]
    fn test_modifier_not_a_hotkey() {
        let keys = KeySettings {
            start_key: "SHIFT".to_string(),
            ..KeySettings::default()
        };
        assert!(check_bindings(&keys).is_err());
        assert!(hotkey_for("F9").is_some());
        assert!(hotkey_for("CTRL").is_none());
    }
}
