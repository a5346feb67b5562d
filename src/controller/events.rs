//! Discrete controller events and the published per-tick summary

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::state::{StateKind, Steer};

/// What caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Trigger {
    AutomationEnabled,
    PanelDetected { confidence: f32 },
    Bubbles,
    HeadingMotion,
    TakeDetected { confidence: f32 },
    Settled,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControllerEvent {
    Transition {
        from: StateKind,
        to: StateKind,
        trigger: Trigger,
    },
    /// A state ran out of time; the cycle restarts from Idle
    Failure {
        state: StateKind,
        #[serde(serialize_with = "millis::serialize")]
        after: Duration,
    },
    /// Automation was disabled while `state` was active
    Cancelled { state: StateKind },
    /// The take icon appeared while reeling
    Catch,
}

impl fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerEvent::Transition { from, to, trigger } => {
                write!(f, "{} -> {} ({:?})", from, to, trigger)
            }
            ControllerEvent::Failure { state, after } => {
                write!(f, "{} timed out after {} ms", state, after.as_millis())
            }
            ControllerEvent::Cancelled { state } => write!(f, "cancelled during {}", state),
            ControllerEvent::Catch => write!(f, "catch"),
        }
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Session statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub catches: u32,
    pub misses: u32,
    /// Percentage of finished cycles that ended in a catch
    pub rate: f64,
}

impl SessionStats {
    pub fn record_catch(&mut self) {
        self.catches += 1;
        self.update_rate();
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.update_rate();
    }

    fn update_rate(&mut self) {
        let total = self.catches + self.misses;
        self.rate = if total > 0 {
            (self.catches as f64 / total as f64) * 100.0
        } else {
            0.0
        };
    }
}

/// Snapshot of the controller for display, replaced every tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSummary {
    pub state: StateKind,
    pub automation_enabled: bool,
    /// Zone centre minus predicted slider position, pixels
    pub slider_offset: Option<f64>,
    pub held: Option<Steer>,
    pub memory_live: bool,
    pub last_event: Option<String>,
    pub stats: SessionStats,
}

impl Default for ControllerSummary {
    fn default() -> Self {
        Self {
            state: StateKind::Idle,
            automation_enabled: false,
            slider_offset: None,
            held: None,
            memory_live: false,
            last_event: None,
            stats: SessionStats::default(),
        }
    }
}

impl ControllerSummary {
    /// Status line for the console reporter
    pub fn status_line(&self) -> String {
        let offset = self
            .slider_offset
            .map(|o| format!("{:+.1}px", o))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} | offset {} | catches {} misses {} ({:.2}%) | last: {}",
            self.state.description(),
            offset,
            self.stats.catches,
            self.stats.misses,
            self.stats.rate,
            self.last_event.as_deref().unwrap_or("-"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_rate() {
        let mut stats = SessionStats::default();
        assert_eq!(stats.rate, 0.0);
        stats.record_catch();
        stats.record_catch();
        stats.record_catch();
        stats.record_miss();
        assert_eq!(stats.catches, 3);
        assert!((stats.rate - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_failure_serializes_millis() {
        let event = ControllerEvent::Failure {
            state: StateKind::Cast,
            after: Duration::from_millis(5000),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["Failure"]["after"], 5000);
        assert_eq!(json["Failure"]["state"], "Cast");
        assert_eq!(event.to_string(), "Cast timed out after 5000 ms");
    }

    #[test]
    fn test_status_line() {
        let summary = ControllerSummary {
            slider_offset: Some(12.0),
            ..ControllerSummary::default()
        };
        let line = summary.status_line();
        assert!(line.starts_with("Idle"));
        assert!(line.contains("+12.0px"));
    }
}
