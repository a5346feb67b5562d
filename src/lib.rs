//! Auto Angler - fishing mini-game automation
//!
//! Reads the player's heading from game memory, finds the mini-game's
//! on-screen cues in captured frames and drives the cast, strike, reel and
//! take phases with simulated keyboard and mouse input.

pub mod controller;
pub mod geometry;
pub mod input;
pub mod journal;
pub mod memory;
pub mod screen_reader;
pub mod tracking;
pub mod utils;
pub mod window;
pub mod worker;

// Re-exports for convenience
pub use controller::{Controller, ControllerEvent, ControllerSummary, StateKind};
pub use geometry::{Point, Rect};
pub use memory::{GameSnapshot, MemoryReader, TargetProcessProvider};
pub use screen_reader::{FrameDetector, FrameSlot, RegionCalculator, ScreenService};
pub use tracking::{HeadingTracker, SliderTracker};
pub use utils::{bot_state, keybinds, path::get_data_dir, settings::BotConfig};
