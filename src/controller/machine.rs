//! The fishing cycle state machine
//!
//! `Controller::tick` runs once per fixed period. Each tick observes the
//! window rectangle, the latest memory snapshot and the latest frame, then
//! advances at most one transition. Nothing inside a tick blocks: detection
//! works on the frame it was handed and input calls are fire-and-forget.

use std::time::{Duration, Instant};

use super::events::{ControllerEvent, ControllerSummary, SessionStats, Trigger};
use super::state::{ControllerState, Scratch, StateKind, Steer};
use crate::geometry::Rect;
use crate::input::InputDispatcher;
use crate::memory::GameSnapshot;
use crate::screen_reader::{CaptureFrame, CueDetector, CueKind, DetectionRegions, RegionCalculator};
use crate::tracking::{HeadingTracker, SliderTracker, TurnDirection};
use crate::utils::settings::BotConfig;

/// Everything the controller observes in one tick
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub now: Instant,
    /// Read fresh every tick, never cached
    pub automation_enabled: bool,
    pub frame: Option<&'a CaptureFrame>,
    pub snapshot: Option<&'a GameSnapshot>,
    /// Current game window, screen coordinates
    pub window: Option<Rect>,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub events: Vec<ControllerEvent>,
}

pub struct Controller {
    config: BotConfig,
    detector: Box<dyn CueDetector>,
    input: Box<dyn InputDispatcher>,
    region_calc: RegionCalculator,
    heading: HeadingTracker,
    slider: SliderTracker,
    state: ControllerState,
    window: Option<Rect>,
    regions: Option<DetectionRegions>,
    region_failed: bool,
    /// Last panel box, screen coordinates; anchors the slider and bobber regions
    anchor: Option<Rect>,
    last_seq: Option<u64>,
    slider_offset: Option<f64>,
    stats: SessionStats,
    summary: ControllerSummary,
}

impl Controller {
    pub fn new(
        config: BotConfig,
        detector: Box<dyn CueDetector>,
        input: Box<dyn InputDispatcher>,
        now: Instant,
    ) -> Self {
        Self {
            region_calc: RegionCalculator::new(config.regions.clone()),
            heading: HeadingTracker::new(config.heading.clone()),
            slider: SliderTracker::new(config.slider.history),
            config,
            detector,
            input,
            state: ControllerState::new(StateKind::Idle, now),
            window: None,
            regions: None,
            region_failed: false,
            anchor: None,
            last_seq: None,
            slider_offset: None,
            stats: SessionStats::default(),
            summary: ControllerSummary::default(),
        }
    }

    pub fn state(&self) -> StateKind {
        self.state.kind()
    }

    /// Direction key currently held down
    pub fn held(&self) -> Option<Steer> {
        self.state.scratch.held
    }

    pub fn summary(&self) -> &ControllerSummary {
        &self.summary
    }

    pub fn heading(&self) -> &HeadingTracker {
        &self.heading
    }

    /// Advance the machine by one tick
    pub fn tick(&mut self, input: TickInput<'_>) -> TickReport {
        let mut events = Vec::new();
        let now = input.now;
        self.observe_window(input.window);
        let memory_live = self.observe_snapshot(now, input.snapshot);

        let kind = self.state.kind();
        // only Reel may hold a key, elsewhere a failed release is retried
        if kind != StateKind::Reel && self.state.scratch.held.is_some() {
            self.apply_steer(None);
        }
        if kind != StateKind::Idle && !input.automation_enabled {
            events.push(ControllerEvent::Cancelled { state: kind });
            self.transition(StateKind::Idle, Trigger::Cancelled, now, Scratch::default(), &mut events);
        } else if kind == StateKind::Idle {
            if input.automation_enabled {
                self.transition(StateKind::Cast, Trigger::AutomationEnabled, now, Scratch::default(), &mut events);
            }
        } else if let Some(after) = self.timed_out(kind, now) {
            tracing::warn!("[CTRL] {} timed out after {} ms", kind, after.as_millis());
            self.stats.record_miss();
            events.push(ControllerEvent::Failure { state: kind, after });
            self.transition(StateKind::Idle, Trigger::Timeout, now, Scratch::default(), &mut events);
        } else {
            match kind {
                StateKind::Cast => self.step_cast(&input, &mut events),
                StateKind::Strike => self.step_strike(&input, memory_live, &mut events),
                StateKind::Reel => self.step_reel(&input, memory_live, &mut events),
                StateKind::End => self.step_end(now, &mut events),
                StateKind::Idle => {}
            }
        }

        self.refresh_summary(input.automation_enabled, memory_live, &events);
        TickReport { events }
    }

    fn timed_out(&self, kind: StateKind, now: Instant) -> Option<Duration> {
        let timing = &self.config.timing;
        let limit = match kind {
            StateKind::Cast => timing.cast_timeout(),
            StateKind::Strike => timing.strike_timeout(),
            StateKind::Reel => timing.reel_timeout(),
            // End always leaves after its settle delay
            StateKind::End | StateKind::Idle => return None,
        };
        let elapsed = self.state.elapsed(now);
        (elapsed >= limit).then_some(elapsed)
    }

    fn observe_window(&mut self, window: Option<Rect>) {
        if window == self.window {
            return;
        }
        tracing::debug!("[REGION] Window changed {:?} -> {:?}", self.window, window);
        self.window = window;
        self.regions = None;
        self.region_failed = false;
        self.anchor = None;
        self.state.scratch.bobber = None;
        self.state.scratch.bubble_baseline = None;
    }

    /// Feed a fresh, unseen snapshot to the heading tracker. Returns whether
    /// memory data is live this tick.
    fn observe_snapshot(&mut self, now: Instant, snapshot: Option<&GameSnapshot>) -> bool {
        let Some(snapshot) = snapshot else {
            return false;
        };
        if !snapshot.is_fresh(now, self.config.timing.snapshot_max_age()) {
            tracing::trace!("[CTRL] Ignoring stale snapshot #{}", snapshot.seq);
            return false;
        }
        if self.last_seq != Some(snapshot.seq) {
            self.heading.update(snapshot.heading);
            self.last_seq = Some(snapshot.seq);
        }
        true
    }

    /// Frame and regions for this tick, when detection can run
    fn vision<'a>(&mut self, frame: Option<&'a CaptureFrame>) -> Option<(&'a CaptureFrame, DetectionRegions)> {
        let frame = frame?;
        let window = self.window?;
        if frame.window() != window {
            tracing::trace!("[CTRL] Frame from {:?} does not match window {:?}", frame.window(), window);
            return None;
        }
        if let Some(regions) = self.regions {
            return Some((frame, regions));
        }
        match self.region_calc.compute(window, self.anchor) {
            Ok(regions) => {
                self.regions = Some(regions);
                self.region_failed = false;
                Some((frame, regions))
            }
            Err(e) => {
                if !self.region_failed {
                    tracing::warn!("[REGION] {}; skipping detection", e);
                    self.region_failed = true;
                }
                None
            }
        }
    }

    fn step_cast(&mut self, input: &TickInput<'_>, events: &mut Vec<ControllerEvent>) {
        let Some((frame, regions)) = self.vision(input.frame) else {
            return;
        };
        let panel = self.detector.detect(frame, &regions.panel, CueKind::Panel);
        tracing::trace!("[CTRL] Panel score {:.3}", panel.confidence);
        if !panel.accepted(self.config.detection.panel_threshold) {
            return;
        }

        if let Some(rect) = panel.rect() {
            self.anchor = Some(frame.rect_to_screen(&rect));
            self.regions = None;
        }
        let trigger = Trigger::PanelDetected {
            confidence: panel.confidence,
        };
        self.transition(StateKind::Strike, trigger, input.now, Scratch::default(), events);
    }

    fn step_strike(&mut self, input: &TickInput<'_>, memory_live: bool, events: &mut Vec<ControllerEvent>) {
        let mut trigger = None;

        if let Some((frame, regions)) = self.vision(input.frame) {
            if self.state.scratch.bobber.is_none() {
                let bobber = self.detector.detect(frame, &regions.bobber, CueKind::Bobber);
                if let (true, Some(rect)) = (bobber.accepted(self.config.detection.bobber_threshold), bobber.rect()) {
                    let screen = frame.rect_to_screen(&rect);
                    let baseline = self.detector.count_circles(frame, &bubble_area(screen, regions.window));
                    tracing::debug!("[CTRL] Bobber at {:?}, {} baseline circles", screen, baseline);
                    self.state.scratch.bobber = Some(screen);
                    self.state.scratch.bubble_baseline = Some(baseline);
                }
            }

            let area = self
                .state
                .scratch
                .bobber
                .map(|b| bubble_area(b, regions.window))
                .unwrap_or(regions.bobber);
            let bubbles = self.detector.detect_bubbles(frame, &area, self.state.scratch.bubble_baseline);
            if bubbles.found {
                trigger = Some(Trigger::Bubbles);
            }
        }

        // Bubbles win; a sustained heading swing is the fallback
        if trigger.is_none() && memory_live && self.heading.moving() {
            trigger = Some(Trigger::HeadingMotion);
        }

        if let Some(trigger) = trigger {
            let key = self.config.keys.strike_key.clone();
            self.tap(&key);
            self.transition(StateKind::Reel, trigger, input.now, Scratch::default(), events);
        }
    }

    fn step_reel(&mut self, input: &TickInput<'_>, memory_live: bool, events: &mut Vec<ControllerEvent>) {
        // Some(None) means "release both", None means no information this tick
        let mut desired: Option<Option<Steer>> = None;
        self.slider_offset = None;

        if let Some((frame, regions)) = self.vision(input.frame) {
            let take = self.detector.detect(frame, &regions.take, CueKind::TakeIcon);
            if take.accepted(self.config.detection.take_threshold) {
                tracing::info!("[CTRL] Take icon found ({:.2})", take.confidence);
                self.stats.record_catch();
                events.push(ControllerEvent::Catch);
                let scratch = Scratch {
                    take_point: take.point().map(|p| frame.point_to_screen(p)),
                    ..Scratch::default()
                };
                let trigger = Trigger::TakeDetected {
                    confidence: take.confidence,
                };
                self.transition(StateKind::End, trigger, input.now, scratch, events);
                return;
            }

            let slider = self.detector.detect(frame, &regions.slider_band, CueKind::Slider);
            let slider_point = slider.point().filter(|_| slider.found);
            if let Some(p) = slider_point {
                let captured_at = frame.captured_at();
                if self.state.scratch.last_slider_frame != Some(captured_at) {
                    let x = frame.point_to_screen(p).x as f64;
                    if let Err(e) = self.slider.observe(captured_at, x) {
                        tracing::trace!("[CTRL] Slider: {}", e);
                    }
                    self.state.scratch.last_slider_frame = Some(captured_at);
                }
            }

            let zone = self.detector.detect(frame, &regions.slider_band, CueKind::GreenZone);
            if let (Some(_), Some(zone_rect), Ok(fit)) = (slider_point, zone.rect().filter(|_| zone.found), self.slider.fit()) {
                let zone_centre = frame.rect_to_screen(&zone_rect).center_x();
                let predicted = fit.predict(self.config.timing.prediction_horizon());
                let offset = zone_centre - predicted;
                tracing::trace!(
                    "[CTRL] Zone {:.1}, slider {:.1} ({:+.0} px/s), offset {:+.1}",
                    zone_centre,
                    predicted,
                    fit.velocity,
                    offset
                );
                self.slider_offset = Some(offset);
                desired = Some(steer_for_offset(offset, self.config.slider.reel_dead_band));
            }
        }

        // Without slider and zone, counter the turn the fish pulls the player into
        if desired.is_none() && memory_live {
            desired = Some(match self.heading.direction() {
                Some(TurnDirection::Right) => Some(Steer::Left),
                Some(TurnDirection::Left) => Some(Steer::Right),
                None => None,
            });
        }

        if let Some(steer) = desired {
            self.apply_steer(steer);
        }
    }

    fn step_end(&mut self, now: Instant, events: &mut Vec<ControllerEvent>) {
        if self.state.elapsed(now) >= self.config.timing.end_settle() {
            self.transition(StateKind::Cast, Trigger::Settled, now, Scratch::default(), events);
        }
    }

    /// Replace the current state. Held keys are released on the way out; a key
    /// whose release failed stays recorded in the new state.
    fn transition(
        &mut self,
        to: StateKind,
        trigger: Trigger,
        now: Instant,
        scratch: Scratch,
        events: &mut Vec<ControllerEvent>,
    ) {
        let from = self.state.kind();
        self.apply_steer(None);
        let stuck = self.state.scratch.held;
        self.state = ControllerState::new(to, now);
        self.state.scratch = scratch;
        self.state.scratch.held = stuck;
        tracing::info!("[CTRL] {} -> {} ({:?})", from, to, trigger);
        events.push(ControllerEvent::Transition { from, to, trigger });
        self.on_enter(to);
    }

    fn on_enter(&mut self, state: StateKind) {
        match state {
            StateKind::Idle => {
                self.slider_offset = None;
            }
            StateKind::Cast => {
                self.slider.reset();
                let key = self.config.keys.cast_key.clone();
                self.tap(&key);
            }
            StateKind::Strike => {
                // re-seed so only motion after the cast counts as a bite
                self.heading.reset();
            }
            StateKind::Reel => {
                self.slider.reset();
            }
            StateKind::End => match self.state.scratch.take_point {
                Some(point) => {
                    if let Err(e) = self.input.click_at(point) {
                        tracing::warn!("[INPUT] Click at ({}, {}) failed: {}", point.x, point.y, e);
                    }
                }
                None => {
                    let key = self.config.keys.confirm_key.clone();
                    self.tap(&key);
                }
            },
        }
    }

    fn key_for(&self, steer: Steer) -> &str {
        match steer {
            Steer::Left => &self.config.keys.left_key,
            Steer::Right => &self.config.keys.right_key,
        }
    }

    fn apply_steer(&mut self, desired: Option<Steer>) {
        let held = self.state.scratch.held;
        if held == desired {
            return;
        }
        if let Some(steer) = held {
            let key = self.key_for(steer).to_string();
            if let Err(e) = self.input.key_up(&key) {
                tracing::error!("[INPUT] Failed to release '{}': {}", key, e);
                return;
            }
            self.state.scratch.held = None;
        }
        if let Some(steer) = desired {
            let key = self.key_for(steer).to_string();
            match self.input.key_down(&key) {
                Ok(()) => self.state.scratch.held = Some(steer),
                Err(e) => tracing::warn!("[INPUT] Failed to hold '{}': {}", key, e),
            }
        }
    }

    fn tap(&mut self, key: &str) {
        if let Err(e) = self.input.tap_key(key) {
            tracing::warn!("[INPUT] Failed to press '{}': {}", key, e);
        }
    }

    fn refresh_summary(&mut self, automation_enabled: bool, memory_live: bool, events: &[ControllerEvent]) {
        let last_event = events
            .last()
            .map(|e| e.to_string())
            .or_else(|| self.summary.last_event.take());
        self.summary = ControllerSummary {
            state: self.state.kind(),
            automation_enabled,
            slider_offset: self.slider_offset,
            held: self.state.scratch.held,
            memory_live,
            last_event,
            stats: self.stats.clone(),
        };
    }
}

/// Direction that moves the slider toward the zone; `None` inside the dead band
pub fn steer_for_offset(offset: f64, dead_band: f64) -> Option<Steer> {
    if offset > dead_band {
        Some(Steer::Right)
    } else if offset < -dead_band {
        Some(Steer::Left)
    } else {
        None
    }
}

/// Search area for bubbles: the float widened by its own size, mostly upward
fn bubble_area(bobber: Rect, window: Rect) -> Rect {
    let (w, h) = (bobber.width as i32, bobber.height as i32);
    let area = Rect::from_corners(bobber.x - w, bobber.y - 2 * h, bobber.right() + w, bobber.bottom() + h);
    window.intersect(&area).unwrap_or(bobber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steer_for_offset() {
        assert_eq!(steer_for_offset(20.0, 8.0), Some(Steer::Right));
        assert_eq!(steer_for_offset(-9.0, 8.0), Some(Steer::Left));
        assert_eq!(steer_for_offset(8.0, 8.0), None);
        assert_eq!(steer_for_offset(-8.0, 8.0), None);
    }

    #[test]
    fn test_bubble_area_clipped_to_window() {
        let window = Rect::new(0, 0, 100, 100);
        let area = bubble_area(Rect::new(10, 10, 10, 10), window);
        assert_eq!(area, Rect::new(0, 0, 30, 30));
        assert!(window.contains_rect(&area));
    }
}
