//! Shared automation flag and the published controller summary

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::controller::ControllerSummary;

/// Start/stop flag flipped by the hotkeys, read by the controller every tick
#[derive(Debug, Clone, Default)]
pub struct AutomationToggle {
    enabled: Arc<AtomicBool>,
}

impl AutomationToggle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Set the flag; returns the previous value
    pub fn set(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::SeqCst)
    }
}

/// Single writer (the controller task), any number of display readers
pub fn summary_channel() -> (watch::Sender<ControllerSummary>, watch::Receiver<ControllerSummary>) {
    watch::channel(ControllerSummary::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::StateKind;

    #[test]
    fn test_toggle_shared_between_clones() {
        let toggle = AutomationToggle::new();
        let other = toggle.clone();
        assert!(!toggle.is_enabled());
        assert!(!other.set(true));
        assert!(toggle.is_enabled());
        assert!(toggle.set(false));
        assert!(!other.is_enabled());
    }

    #[test]
    fn test_summary_channel_latest_value() {
        let (tx, rx) = summary_channel();
        assert_eq!(rx.borrow().state, StateKind::Idle);
        let summary = ControllerSummary {
            state: StateKind::Reel,
            ..ControllerSummary::default()
        };
        tx.send_replace(summary);
        assert_eq!(rx.borrow().state, StateKind::Reel);
    }
}
