//! Slider position/velocity estimate over a bounded sample history

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("insufficient data: {samples} sample(s), need at least 2")]
    InsufficientData { samples: usize },
}

/// Least-squares line through the history, time measured from the oldest sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderFit {
    /// Pixels per second
    pub velocity: f64,
    /// Fitted position at the oldest sample's timestamp
    pub intercept: f64,
    /// Newest sample's time, seconds after the oldest
    pub span: f64,
}

impl SliderFit {
    /// Fitted position `horizon` after the newest sample
    pub fn predict(&self, horizon: Duration) -> f64 {
        self.intercept + self.velocity * (self.span + horizon.as_secs_f64())
    }

    /// Fitted position at the newest sample
    pub fn current(&self) -> f64 {
        self.intercept + self.velocity * self.span
    }
}

#[derive(Debug, Clone)]
pub struct SliderTracker {
    capacity: usize,
    samples: VecDeque<(Instant, f64)>,
    fit: Option<SliderFit>,
}

impl SliderTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            fit: None,
        }
    }

    /// Append a sample, evicting the oldest at capacity, and refit
    pub fn observe(&mut self, timestamp: Instant, position: f64) -> Result<SliderFit, TrackerError> {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp, position));
        self.fit = fit_line(&self.samples);
        self.fit.ok_or(TrackerError::InsufficientData {
            samples: self.samples.len(),
        })
    }

    /// Latest fit, if enough samples have been observed
    pub fn fit(&self) -> Result<SliderFit, TrackerError> {
        self.fit.ok_or(TrackerError::InsufficientData {
            samples: self.samples.len(),
        })
    }

    pub fn velocity(&self) -> Option<f64> {
        self.fit.map(|f| f.velocity)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first view of the history
    pub fn samples(&self) -> impl Iterator<Item = &(Instant, f64)> {
        self.samples.iter()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.fit = None;
    }
}

fn fit_line(samples: &VecDeque<(Instant, f64)>) -> Option<SliderFit> {
    if samples.len() < 2 {
        return None;
    }
    let t0 = samples.front()?.0;
    let n = samples.len() as f64;

    let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
    let mut span = 0.0;
    for (t, x) in samples {
        let t = t.saturating_duration_since(t0).as_secs_f64();
        sx += t;
        sy += x;
        sxy += t * x;
        sxx += t * t;
        span = t;
    }

    let d = n * sxx - sx * sx;
    // All samples at the same instant: no usable slope, hold the mean
    if d.abs() <= 1e-12 {
        return Some(SliderFit {
            velocity: 0.0,
            intercept: sy / n,
            span,
        });
    }
    let velocity = (n * sxy - sx * sy) / d;
    let intercept = (sy - velocity * sx) / n;
    Some(SliderFit {
        velocity,
        intercept,
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn test_single_sample_is_insufficient() {
        let mut tracker = SliderTracker::new(8);
        let t0 = Instant::now();
        assert_eq!(
            tracker.observe(t0, 100.0),
            Err(TrackerError::InsufficientData { samples: 1 })
        );
        assert!(tracker.velocity().is_none());
    }

    #[test]
    fn test_two_samples_give_velocity() {
        let mut tracker = SliderTracker::new(8);
        let t0 = Instant::now();
        tracker.observe(t0, 100.0).unwrap_err();
        let fit = tracker.observe(at(t0, 50), 120.0).unwrap();
        assert!((fit.velocity - 400.0).abs() < 1e-6);
        assert!((fit.current() - 120.0).abs() < 1e-6);
        assert!((fit.predict(Duration::from_millis(100)) - 160.0).abs() < 1e-6);
    }

    #[test]
    fn test_regression_over_noisy_line() {
        let mut tracker = SliderTracker::new(8);
        let t0 = Instant::now();
        let noise = [1.0, -1.0, 0.5, -0.5, 1.0, -1.0];
        let mut fit = None;
        for (i, n) in noise.iter().enumerate() {
            let ms = i as u64 * 20;
            fit = tracker.observe(at(t0, ms), 50.0 - 0.3 * ms as f64 + n).ok();
        }
        let fit = fit.unwrap();
        assert!((fit.velocity + 300.0).abs() < 30.0, "velocity {}", fit.velocity);
    }

    #[test]
    fn test_history_never_exceeds_capacity() {
        let mut tracker = SliderTracker::new(4);
        let t0 = Instant::now();
        for i in 0..10u64 {
            let _ = tracker.observe(at(t0, i * 10), i as f64);
            assert!(tracker.len() <= 4);
        }
        let oldest: Vec<f64> = tracker.samples().map(|s| s.1).collect();
        assert_eq!(oldest, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_identical_timestamps_hold_mean() {
        let mut tracker = SliderTracker::new(4);
        let t0 = Instant::now();
        tracker.observe(t0, 10.0).unwrap_err();
        let fit = tracker.observe(t0, 20.0).unwrap();
        assert_eq!(fit.velocity, 0.0);
        assert_eq!(fit.current(), 15.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut tracker = SliderTracker::new(4);
        let t0 = Instant::now();
        tracker.observe(t0, 1.0).unwrap_err();
        tracker.observe(at(t0, 10), 2.0).unwrap();
        tracker.reset();
        assert!(tracker.is_empty());
        assert!(tracker.fit().is_err());
    }
}
