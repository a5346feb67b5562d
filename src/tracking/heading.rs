//! Smoothed angular velocity from raw player heading samples
//!
//! The player entity turns with the camera while a fish is being reeled, so
//! the per-tick heading change tells which way the fish is pulling. Raw
//! samples are noisy and wrap at ±π; this filter unwraps each step, clamps
//! it, and runs an exponential moving average over the result.

use serde::Serialize;

use crate::geometry::{angle_delta, wrap_angle};
use crate::utils::settings::HeadingSettings;

/// Direction the heading is turning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    fn agrees_with(self, delta: f64) -> bool {
        match self {
            TurnDirection::Right => delta > 0.0,
            TurnDirection::Left => delta < 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadingTracker {
    settings: HeadingSettings,
    previous: Option<f64>,
    smoothed: f64,
    direction: Option<TurnDirection>,
    /// Previous clamped raw step, zero until one exists
    last_step: f64,
    sustained: u32,
}

impl HeadingTracker {
    pub fn new(settings: HeadingSettings) -> Self {
        Self {
            settings,
            previous: None,
            smoothed: 0.0,
            direction: None,
            last_step: 0.0,
            sustained: 0,
        }
    }

    /// Feed one raw heading (radians) and return the smoothed per-tick delta.
    ///
    /// The first sample only seeds the filter and returns zero. Non-finite
    /// samples are ignored and leave the state untouched.
    pub fn update(&mut self, raw_heading: f64) -> f64 {
        if !raw_heading.is_finite() {
            return self.smoothed;
        }
        let heading = wrap_angle(raw_heading);

        let previous = match self.previous.replace(heading) {
            Some(p) => p,
            None => {
                self.smoothed = 0.0;
                return 0.0;
            }
        };

        let max_step = self.settings.max_step.abs();
        let delta = angle_delta(previous, heading).clamp(-max_step, max_step);
        let alpha = self.settings.alpha;
        self.smoothed = alpha * delta + (1.0 - alpha) * self.smoothed;

        self.update_direction(delta);
        self.update_motion(delta);
        self.last_step = delta;

        tracing::trace!(
            "[HEADING] raw={:.4} delta={:.4} smoothed={:.4} dir={:?}",
            heading,
            delta,
            self.smoothed,
            self.direction
        );

        self.smoothed
    }

    // A direction needs the filtered value and the latest raw step to agree.
    // A new direction is also refused on a step that reverses the previous
    // one, so an outlier and its return step cannot both set a direction.
    fn update_direction(&mut self, delta: f64) {
        let threshold = self.settings.direction_threshold;
        let candidate = if self.smoothed > threshold {
            Some(TurnDirection::Right)
        } else if self.smoothed < -threshold {
            Some(TurnDirection::Left)
        } else {
            None
        };
        let reversal = self.last_step * delta < 0.0;

        let next = match candidate {
            Some(d) if d.agrees_with(delta) && (self.direction == Some(d) || !reversal) => Some(d),
            _ => self.direction.filter(|d| d.agrees_with(delta)),
        };

        if next != self.direction {
            tracing::debug!(
                "[HEADING] direction {:?} -> {:?} (smoothed={:.4}, delta={:.4})",
                self.direction,
                next,
                self.smoothed,
                delta
            );
        }
        self.direction = next;
    }

    fn update_motion(&mut self, delta: f64) {
        let above = self.smoothed.abs() > self.settings.motion_threshold
            && delta != 0.0
            && delta.signum() == self.smoothed.signum();
        if above {
            self.sustained = self.sustained.saturating_add(1);
        } else {
            self.sustained = 0;
        }
    }

    /// Last smoothed delta, zero before the second sample
    pub fn smoothed_delta(&self) -> f64 {
        self.smoothed
    }

    pub fn direction(&self) -> Option<TurnDirection> {
        self.direction
    }

    /// True once the heading has kept turning for the configured number of ticks
    pub fn moving(&self) -> bool {
        self.sustained >= self.settings.sustain_ticks.max(1)
    }

    pub fn is_seeded(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.smoothed = 0.0;
        self.direction = None;
        self.last_step = 0.0;
        self.sustained = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> HeadingTracker {
        HeadingTracker::new(HeadingSettings::default())
    }

    fn deg(v: f64) -> f64 {
        v.to_radians()
    }

    #[test]
    fn test_first_sample_seeds_with_zero() {
        let mut ht = tracker();
        assert_eq!(ht.update(1.0), 0.0);
        assert!(ht.is_seeded());
        assert!(ht.direction().is_none());
    }

    #[test]
    fn test_stable_heading_has_no_direction() {
        let mut ht = tracker();
        for _ in 0..20 {
            ht.update(deg(90.0));
        }
        assert!(ht.direction().is_none());
        assert!(!ht.moving());
        assert_eq!(ht.smoothed_delta(), 0.0);
    }

    #[test]
    fn test_increasing_heading_turns_right() {
        let mut ht = tracker();
        let dirs: Vec<_> = (0..20).map(|i| {
            ht.update(deg(i as f64 * 2.0));
            ht.direction()
        }).collect();
        assert!(dirs.contains(&Some(TurnDirection::Right)));
        assert!(ht.moving());
        assert!(ht.smoothed_delta() > 0.0);
    }

    #[test]
    fn test_decreasing_heading_turns_left() {
        let mut ht = tracker();
        for i in 0..20 {
            ht.update(deg(90.0 - i as f64 * 2.0));
        }
        assert_eq!(ht.direction(), Some(TurnDirection::Left));
    }

    #[test]
    fn test_wraparound_is_a_small_step() {
        let mut ht = tracker();
        ht.update(3.1);
        let d = ht.update(-3.1);
        assert!(d > 0.0, "crossing +π should read as a small positive turn, got {}", d);
        assert!(d < 0.1, "crossing +π must not produce a jump, got {}", d);
    }

    #[test]
    fn test_wraparound_keeps_direction() {
        let mut ht = tracker();
        for h in [178.0, 179.0, 180.0, -179.0, -178.0, -177.0, -176.0] {
            ht.update(deg(h));
        }
        assert_eq!(ht.direction(), Some(TurnDirection::Right));
    }

    #[test]
    fn test_output_bounded_under_noise() {
        let mut ht = tracker();
        let max = HeadingSettings::default().max_step;
        for i in 0..200 {
            let raw = if i % 2 == 0 { 3.0 } else { -0.2 };
            let d = ht.update(raw);
            assert!(d.abs() <= max + 1e-12);
        }
    }

    #[test]
    fn test_single_outlier_costs_at_most_one_tick() {
        let mut ht = tracker();
        let mut heading = 0.0;
        for _ in 0..20 {
            heading -= deg(1.0);
            ht.update(heading);
        }
        assert_eq!(ht.direction(), Some(TurnDirection::Left));

        // one wild sample, then the steady leftward turn resumes
        ht.update(heading + deg(40.0));
        let mut wrong = usize::from(ht.direction() == Some(TurnDirection::Right));
        for _ in 0..30 {
            heading -= deg(1.0);
            ht.update(heading);
            if ht.direction() == Some(TurnDirection::Right) {
                wrong += 1;
            }
        }
        assert!(wrong <= 1, "outlier held the wrong direction for {} ticks", wrong);
        assert_eq!(ht.direction(), Some(TurnDirection::Left));
    }

    #[test]
    fn test_outlier_while_stationary_sets_direction_once() {
        let mut ht = tracker();
        for _ in 0..20 {
            ht.update(1.0);
        }
        assert!(ht.direction().is_none());

        let mut dirs = Vec::new();
        ht.update(1.0 + deg(40.0));
        dirs.push(ht.direction());
        for _ in 0..10 {
            ht.update(1.0);
            dirs.push(ht.direction());
        }
        let ticks = dirs.iter().filter(|d| d.is_some()).count();
        assert!(ticks <= 1, "one outlier gave a direction on {} ticks: {:?}", ticks, dirs);
        assert!(!dirs.contains(&Some(TurnDirection::Left)));
    }

    #[test]
    fn test_reversal_takes_effect_after_one_tick() {
        let mut ht = tracker();
        let mut heading = 0.0;
        for _ in 0..10 {
            heading += deg(2.0);
            ht.update(heading);
        }
        assert_eq!(ht.direction(), Some(TurnDirection::Right));
        for _ in 0..10 {
            heading -= deg(2.0);
            ht.update(heading);
        }
        assert_eq!(ht.direction(), Some(TurnDirection::Left));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut ht = tracker();
        for i in 0..10 {
            ht.update(deg(i as f64 * 3.0));
        }
        assert!(ht.moving());
        ht.reset();
        assert!(!ht.moving());
        assert!(!ht.is_seeded());
        assert_eq!(ht.smoothed_delta(), 0.0);
    }

    #[test]
    fn test_non_finite_sample_ignored() {
        let mut ht = tracker();
        ht.update(0.0);
        ht.update(deg(2.0));
        let before = ht.smoothed_delta();
        assert_eq!(ht.update(f64::NAN), before);
    }
}
