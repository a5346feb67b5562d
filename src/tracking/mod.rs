//! Trajectory filters fed once per tick by the controller

pub mod heading;
pub mod slider;

pub use heading::{HeadingTracker, TurnDirection};
pub use slider::{SliderFit, SliderTracker, TrackerError};
