//! Screen reader module for capturing and analyzing the game window

pub mod base;
pub mod detector;
pub mod image_service;
pub mod regions;
pub mod screen_service;

pub use base::{CaptureFrame, CueGeometry, CueKind, DetectionResult};
pub use detector::{CueDetector, FrameDetector};
pub use image_service::{DetectionError, Template};
pub use regions::{DetectionRegions, RegionCalculator, RegionError};
pub use screen_service::{FrameProvider, FrameSlot, ScreenService};
