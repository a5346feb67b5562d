//! Input simulation for keyboard and mouse control

use thiserror::Error;

use crate::geometry::Point;

#[cfg(windows)]
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("input backend failed: {0}")]
    Backend(String),
    #[error("input simulation not implemented on this platform")]
    Unsupported,
}

/// Primitive OS input. Each call is fire-and-forget apart from its result.
pub trait InputDispatcher: Send {
    fn key_down(&mut self, key: &str) -> Result<(), InputError>;
    fn key_up(&mut self, key: &str) -> Result<(), InputError>;
    /// Press and release
    fn tap_key(&mut self, key: &str) -> Result<(), InputError>;
    fn click_at(&mut self, point: Point) -> Result<(), InputError>;
    fn mouse_move(&mut self, point: Point) -> Result<(), InputError>;
}

/// enigo-backed dispatcher
#[cfg(windows)]
pub struct EnigoInput {
    enigo: Enigo,
}

#[cfg(windows)]
impl EnigoInput {
    pub fn new() -> Result<Self, InputError> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| InputError::Backend(format!("{:?}", e)))?;
        Ok(Self { enigo })
    }

    fn key(&mut self, key: &str, direction: Direction) -> Result<(), InputError> {
        let enigo_key = string_to_enigo_key(key).ok_or_else(|| InputError::UnknownKey(key.to_string()))?;
        self.enigo
            .key(enigo_key, direction)
            .map_err(|e| InputError::Backend(format!("key '{}' {:?}: {:?}", key, direction, e)))
    }
}

#[cfg(windows)]
impl InputDispatcher for EnigoInput {
    fn key_down(&mut self, key: &str) -> Result<(), InputError> {
        tracing::debug!("[INPUT] Key down '{}'", key);
        self.key(key, Direction::Press)
    }

    fn key_up(&mut self, key: &str) -> Result<(), InputError> {
        tracing::debug!("[INPUT] Key up '{}'", key);
        self.key(key, Direction::Release)
    }

    fn tap_key(&mut self, key: &str) -> Result<(), InputError> {
        tracing::debug!("[INPUT] Tap '{}'", key);
        self.key(key, Direction::Click)
    }

    fn click_at(&mut self, point: Point) -> Result<(), InputError> {
        self.mouse_move(point)?;
        tracing::debug!("[INPUT] Click at ({}, {})", point.x, point.y);
        self.enigo
            .button(Button::Left, Direction::Click)
            .map_err(|e| InputError::Backend(format!("click: {:?}", e)))
    }

    fn mouse_move(&mut self, point: Point) -> Result<(), InputError> {
        self.enigo
            .move_mouse(point.x, point.y, Coordinate::Abs)
            .map_err(|e| InputError::Backend(format!("move to ({}, {}): {:?}", point.x, point.y, e)))
    }
}

/// Placeholder dispatcher; every call fails with `Unsupported`
#[cfg(not(windows))]
pub struct EnigoInput;

#[cfg(not(windows))]
impl EnigoInput {
    pub fn new() -> Result<Self, InputError> {
        tracing::warn!("[INPUT] Input simulation not implemented on this platform");
        Ok(Self)
    }
}

#[cfg(not(windows))]
impl InputDispatcher for EnigoInput {
    fn key_down(&mut self, _key: &str) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }

    fn key_up(&mut self, _key: &str) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }

    fn tap_key(&mut self, _key: &str) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }

    fn click_at(&mut self, _point: Point) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }

    fn mouse_move(&mut self, _point: Point) -> Result<(), InputError> {
        Err(InputError::Unsupported)
    }
}

/// Convert string key name to enigo Key
#[cfg(windows)]
fn string_to_enigo_key(key: &str) -> Option<Key> {
    // Lowercase avoids keyboard layout mapping issues
    if key.len() == 1 {
        let c = key.chars().next()?.to_ascii_lowercase();
        return Some(Key::Unicode(c));
    }

    match key.to_uppercase().as_str() {
        "F1" => Some(Key::F1),
        "F2" => Some(Key::F2),
        "F3" => Some(Key::F3),
        "F4" => Some(Key::F4),
        "F5" => Some(Key::F5),
        "F6" => Some(Key::F6),
        "F7" => Some(Key::F7),
        "F8" => Some(Key::F8),
        "F9" => Some(Key::F9),
        "F10" => Some(Key::F10),
        "F11" => Some(Key::F11),
        "F12" => Some(Key::F12),
        "ESC" | "ESCAPE" => Some(Key::Escape),
        "ENTER" | "RETURN" => Some(Key::Return),
        "SPACE" => Some(Key::Space),
        "TAB" => Some(Key::Tab),
        "BACKSPACE" => Some(Key::Backspace),
        "UP" => Some(Key::UpArrow),
        "DOWN" => Some(Key::DownArrow),
        "LEFT" => Some(Key::LeftArrow),
        "RIGHT" => Some(Key::RightArrow),
        "SHIFT" => Some(Key::Shift),
        "CTRL" | "CONTROL" => Some(Key::Control),
        "ALT" => Some(Key::Alt),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(windows)]
    fn test_string_to_enigo_key() {
        assert!(string_to_enigo_key("A").is_some());
        assert!(string_to_enigo_key("space").is_some());
        assert!(string_to_enigo_key("ESC").is_some());
        assert!(string_to_enigo_key("INVALID_KEY_NAME_THAT_DOES_NOT_EXIST").is_none());
    }

    #[test]
    #[cfg(not(windows))]
    fn test_unsupported_platform_reports_errors() {
        let mut input = EnigoInput::new().unwrap();
        assert!(matches!(input.key_down("A"), Err(InputError::Unsupported)));
        assert!(matches!(input.click_at(Point::new(1, 1)), Err(InputError::Unsupported)));
    }
}
