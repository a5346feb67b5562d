//! Detection regions derived from the game window rectangle
//!
//! Pure functions of their inputs: a moved or resized window simply yields a
//! new set of regions on the next call.

use thiserror::Error;

use crate::geometry::Rect;
use crate::utils::settings::RegionSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("window rect {0:?} is empty")]
    InvalidWindow(Rect),
    #[error("{name} region falls outside window {window:?}")]
    EmptyRegion { name: &'static str, window: Rect },
}

/// Screen-space search areas, each contained in `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionRegions {
    pub window: Rect,
    /// Lower band where the mini-game panel appears
    pub panel: Rect,
    /// Narrow band holding the slider and the green zone
    pub slider_band: Rect,
    /// Where the float sits while waiting for a bite
    pub bobber: Rect,
    pub take: Rect,
}

#[derive(Debug, Clone)]
pub struct RegionCalculator {
    settings: RegionSettings,
}

impl RegionCalculator {
    pub fn new(settings: RegionSettings) -> Self {
        Self { settings }
    }

    /// Compute every region for `window`. `anchor` is the last located panel
    /// box in screen coordinates, if any.
    pub fn compute(&self, window: Rect, anchor: Option<Rect>) -> Result<DetectionRegions, RegionError> {
        if window.is_empty() {
            return Err(RegionError::InvalidWindow(window));
        }
        let s = &self.settings;
        let (w, h) = (window.width as f64, window.height as f64);
        let frac = |v: f64| v.round() as i32;

        let panel_top = window.y + frac(h * s.panel_top.clamp(0.0, 1.0));
        let panel = Rect::from_corners(window.x, panel_top, window.right(), window.bottom());

        // anchors outside the window are stale
        let anchor = anchor.filter(|a| !a.is_empty() && window.intersect(a).is_some());

        let fallback_band = Rect::new(
            window.x + frac(w * s.slider_fallback_left),
            window.y + frac(h * s.slider_fallback_top),
            frac(w * s.slider_fallback_width).max(0) as u32,
            frac(h * s.slider_fallback_height).max(0) as u32,
        );
        let fallback_bobber = Rect::from_corners(
            window.x + frac(w / 4.0),
            window.y + frac(h / 4.0),
            window.right(),
            window.bottom(),
        );

        // anchor-relative areas that leave the window fall back to the defaults
        let slider_band = anchor
            .map(|a| {
                let cx = a.center().x;
                let half = s.slider_half_width as i32;
                Rect::from_corners(cx - half, a.y, cx + half, a.bottom())
            })
            .filter(|r| window.intersect(r).is_some())
            .unwrap_or(fallback_band);

        let bobber = anchor
            .map(|a| {
                let ah = a.height as f64;
                Rect::from_corners(
                    a.right(),
                    a.y - frac(ah * s.bobber_up),
                    a.right() + frac(ah * s.bobber_right),
                    a.bottom() + frac(ah * s.bobber_down),
                )
            })
            .filter(|r| window.intersect(r).is_some())
            .unwrap_or(fallback_bobber);

        let take = Rect::new(
            window.x + frac(w / 5.0),
            window.y + frac(h / 4.0),
            frac(w * 3.0 / 5.0) as u32,
            frac(h / 2.0) as u32,
        );

        let clip = |name: &'static str, r: Rect| {
            window
                .intersect(&r)
                .ok_or(RegionError::EmptyRegion { name, window })
        };

        let regions = DetectionRegions {
            window,
            panel: clip("panel", panel)?,
            slider_band: clip("slider", slider_band)?,
            bobber: clip("bobber", bobber)?,
            take: clip("take", take)?,
        };
        tracing::debug!("[REGION] Computed regions for {:?} (anchor {:?})", window, anchor);
        Ok(regions)
    }
}
