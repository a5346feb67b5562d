//! Point-in-time read of the local player entity

use std::time::{Duration, Instant};

use crate::geometry::Vec3;

/// Orientation rows and translation of the player entity's world matrix.
/// The entity turns with the camera, so this doubles as the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraTransform {
    pub right: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub translation: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameSnapshot {
    pub position: Vec3,
    /// Radians in [-π, π], zero facing +Y, positive turning toward +X
    pub heading: f64,
    pub camera: CameraTransform,
    /// Increases by one per successful read of a connected reader
    pub seq: u64,
    pub captured_at: Instant,
}

impl GameSnapshot {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }

    pub fn is_fresh(&self, now: Instant, max_age: Duration) -> bool {
        self.age(now) <= max_age
    }
}
