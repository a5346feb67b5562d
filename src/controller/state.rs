//! Controller state and per-state scratch values

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

use crate::geometry::{Point, Rect};

/// The five phases of one fishing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StateKind {
    Idle,
    Cast,
    Strike,
    Reel,
    End,
}

impl StateKind {
    pub fn description(&self) -> &'static str {
        match self {
            StateKind::Idle => "Idle",
            StateKind::Cast => "Casting line...",
            StateKind::Strike => "Waiting for a bite...",
            StateKind::Reel => "Reeling in...",
            StateKind::End => "Taking the catch...",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Direction key held while reeling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Steer {
    Left,
    Right,
}

/// Values that only live as long as one state
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    pub held: Option<Steer>,
    /// Float location, screen coordinates
    pub bobber: Option<Rect>,
    /// Circles around the float before any bite
    pub bubble_baseline: Option<usize>,
    /// Take icon centre, screen coordinates
    pub take_point: Option<Point>,
    /// Capture time of the last frame fed to the slider tracker
    pub last_slider_frame: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct ControllerState {
    kind: StateKind,
    entered_at: Instant,
    pub scratch: Scratch,
}

impl ControllerState {
    pub fn new(kind: StateKind, entered_at: Instant) -> Self {
        Self {
            kind,
            entered_at,
            scratch: Scratch::default(),
        }
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn entered_at(&self) -> Instant {
        self.entered_at
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entered_at)
    }
}
