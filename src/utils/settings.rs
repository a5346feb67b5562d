//! Startup configuration: geometry, thresholds, timings and key bindings
//!
//! Everything here is tuned for one game build and read once at startup from
//! `config/settings.json`. Missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::utils::keybinds::check_bindings;
use crate::utils::path::get_data_dir;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Full bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub window: WindowSettings,
    pub keys: KeySettings,
    pub timing: TimingSettings,
    pub detection: DetectionSettings,
    pub heading: HeadingSettings,
    pub slider: SliderSettings,
    pub regions: RegionSettings,
    pub memory: MemoryLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub title: String,
    pub process_name: String,
    pub module_name: String,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Majestic Multiplayer".to_string(),
            process_name: "GTA5.exe".to_string(),
            module_name: "GTA5.exe".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    pub start_key: String,
    pub stop_key: String,
    pub cast_key: String,
    pub strike_key: String,
    pub confirm_key: String,
    pub left_key: String,
    pub right_key: String,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            start_key: "F9".to_string(),
            stop_key: "F10".to_string(),
            cast_key: "SPACE".to_string(),
            strike_key: "SPACE".to_string(),
            confirm_key: "E".to_string(),
            left_key: "A".to_string(),
            right_key: "D".to_string(),
        }
    }
}

/// Timing constants, all in milliseconds on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub tick_ms: u64,
    pub memory_poll_ms: u64,
    pub memory_read_timeout_ms: u64,
    pub capture_ms: u64,
    pub capture_timeout_ms: u64,
    pub snapshot_max_age_ms: u64,
    pub cast_timeout_ms: u64,
    pub strike_timeout_ms: u64,
    pub reel_timeout_ms: u64,
    pub end_settle_ms: u64,
    pub prediction_horizon_ms: u64,
    pub reconnect_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            memory_poll_ms: 50,
            memory_read_timeout_ms: 20,
            capture_ms: 33,
            capture_timeout_ms: 200,
            snapshot_max_age_ms: 250,
            cast_timeout_ms: 5_000,
            strike_timeout_ms: 30_000,
            reel_timeout_ms: 45_000,
            end_settle_ms: 3_000,
            prediction_horizon_ms: 100,
            reconnect_ms: 2_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl TimingSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn memory_poll(&self) -> Duration {
        Duration::from_millis(self.memory_poll_ms)
    }

    pub fn memory_read_timeout(&self) -> Duration {
        Duration::from_millis(self.memory_read_timeout_ms)
    }

    pub fn capture(&self) -> Duration {
        Duration::from_millis(self.capture_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn snapshot_max_age(&self) -> Duration {
        Duration::from_millis(self.snapshot_max_age_ms)
    }

    pub fn cast_timeout(&self) -> Duration {
        Duration::from_millis(self.cast_timeout_ms)
    }

    pub fn strike_timeout(&self) -> Duration {
        Duration::from_millis(self.strike_timeout_ms)
    }

    pub fn reel_timeout(&self) -> Duration {
        Duration::from_millis(self.reel_timeout_ms)
    }

    pub fn end_settle(&self) -> Duration {
        Duration::from_millis(self.end_settle_ms)
    }

    pub fn prediction_horizon(&self) -> Duration {
        Duration::from_millis(self.prediction_horizon_ms)
    }

    pub fn reconnect(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }

    /// Opening the target and scanning for the player
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Inclusive HSV range on OpenCV's scale (hue 0-180, saturation/value 0-255)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl HsvRange {
    pub fn new(low: [u8; 3], high: [u8; 3]) -> Self {
        Self { low, high }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Reference images, relative to `<data_dir>/reference`
    pub panel_template: String,
    pub take_template: String,
    pub bobber_template: String,
    pub panel_threshold: f32,
    pub take_threshold: f32,
    pub bobber_threshold: f32,
    pub green_hsv: HsvRange,
    pub slider_hsv: HsvRange,
    /// Minimum marker pixels before a green zone or slider counts as visible
    pub min_mask_pixels: u32,
    pub hough_dp: f64,
    pub hough_min_dist: f64,
    pub hough_canny: f64,
    pub hough_accumulator: f64,
    pub bubble_min_radius: i32,
    pub bubble_max_radius: i32,
    pub bubble_margin: usize,
    pub default_bubble_baseline: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            panel_template: "green_bar.png".to_string(),
            take_template: "take.png".to_string(),
            bobber_template: "bobber.png".to_string(),
            panel_threshold: 0.8,
            take_threshold: 0.85,
            bobber_threshold: 0.8,
            green_hsv: HsvRange::new([35, 50, 85], [85, 255, 255]),
            slider_hsv: HsvRange::new([0, 0, 200], [180, 50, 255]),
            min_mask_pixels: 4,
            hough_dp: 1.2,
            hough_min_dist: 15.0,
            hough_canny: 80.0,
            hough_accumulator: 20.0,
            bubble_min_radius: 4,
            bubble_max_radius: 20,
            bubble_margin: 2,
            default_bubble_baseline: 3,
        }
    }
}

/// Heading filter tuning; angles in radians
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingSettings {
    pub alpha: f64,
    pub direction_threshold: f64,
    pub motion_threshold: f64,
    pub max_step: f64,
    pub sustain_ticks: u32,
}

impl Default for HeadingSettings {
    fn default() -> Self {
        // Reel turns the player by roughly 1-2 degrees per 50 ms tick
        Self {
            alpha: 0.4,
            direction_threshold: 0.3_f64.to_radians(),
            motion_threshold: 0.2_f64.to_radians(),
            max_step: 15.0_f64.to_radians(),
            sustain_ticks: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderSettings {
    pub history: usize,
    /// Offsets (pixels) at or below this release both direction keys
    pub reel_dead_band: f64,
}

impl Default for SliderSettings {
    fn default() -> Self {
        Self {
            history: 8,
            reel_dead_band: 8.0,
        }
    }
}

/// Region geometry as fractions of the window size unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Top of the panel search band
    pub panel_top: f64,
    /// Half width of the slider band around the anchor centre, pixels
    pub slider_half_width: u32,
    /// Fallback slider band when no panel anchor is known
    pub slider_fallback_top: f64,
    pub slider_fallback_height: f64,
    pub slider_fallback_left: f64,
    pub slider_fallback_width: f64,
    /// Bobber search relative to the anchor, in anchor heights
    pub bobber_up: f64,
    pub bobber_right: f64,
    pub bobber_down: f64,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            panel_top: 0.5,
            slider_half_width: 700,
            slider_fallback_top: 0.75,
            slider_fallback_height: 0.1,
            slider_fallback_left: 0.2,
            slider_fallback_width: 0.6,
            bobber_up: 2.0,
            bobber_right: 6.0,
            bobber_down: 2.0,
        }
    }
}

/// Where the local player entity lives in the target process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLayout {
    /// Byte signature, `??` marks a wildcard byte
    pub signature: String,
    /// Offset of the rel32 operand inside the signature
    pub rel_offset: usize,
    /// Offset of the instruction end the rel32 is relative to
    pub rip_offset: usize,
    /// Factory field holding the local player entity
    pub player_offset: u64,
    pub right_offset: u64,
    pub forward_offset: u64,
    pub up_offset: u64,
    pub position_offset: u64,
    pub min_valid_pointer: u64,
    pub scan_chunk: usize,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            signature: "48 8B 05 ?? ?? ?? ?? 48 8B 48 08".to_string(),
            rel_offset: 3,
            rip_offset: 7,
            player_offset: 0x8,
            right_offset: 0x60,
            forward_offset: 0x70,
            up_offset: 0x80,
            position_offset: 0x90,
            min_valid_pointer: 0x10000,
            scan_chunk: 1 << 20,
        }
    }
}

impl BotConfig {
    /// Default settings file location
    pub fn default_path() -> PathBuf {
        get_data_dir().join("config").join("settings.json")
    }

    /// Directory holding reference images
    pub fn reference_dir() -> PathBuf {
        get_data_dir().join("reference")
    }

    /// Load from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("[INIT] No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BotConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default settings file, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("[INIT] {}; falling back to default settings", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.tick_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "timing.tick_ms",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.heading.alpha > 0.0 && self.heading.alpha <= 1.0) {
            return Err(ConfigError::Invalid {
                name: "heading.alpha",
                reason: format!("{} is outside (0, 1]", self.heading.alpha),
            });
        }
        if self.slider.history < 2 {
            return Err(ConfigError::Invalid {
                name: "slider.history",
                reason: "needs room for at least two samples".to_string(),
            });
        }
        for (name, t) in [
            ("detection.panel_threshold", self.detection.panel_threshold),
            ("detection.take_threshold", self.detection.take_threshold),
            ("detection.bobber_threshold", self.detection.bobber_threshold),
        ] {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::Invalid {
                    name,
                    reason: format!("{} is outside [0, 1]", t),
                });
            }
        }
        check_bindings(&self.keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.tick(), Duration::from_millis(50));
        assert_eq!(config.keys.left_key, "A");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "timing": { "cast_timeout_ms": 7000 }, "keys": { "left_key": "Q" } }"#;
        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timing.cast_timeout(), Duration::from_millis(7000));
        assert_eq!(config.timing.tick_ms, 50);
        assert_eq!(config.keys.left_key, "Q");
        assert_eq!(config.keys.right_key, "D");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = BotConfig::load_from(Path::new("definitely/not/here/settings.json")).unwrap();
        assert_eq!(config.slider.history, 8);
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let mut config = BotConfig::default();
        config.heading.alpha = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "heading.alpha", .. })
        ));
    }
}
