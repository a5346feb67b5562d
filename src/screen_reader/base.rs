//! Base types for screen reading: captured frames and detection results

use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::geometry::{Point, Rect};

/// Visual cue the detector can look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CueKind {
    /// Mini-game panel (slider bar template)
    Panel,
    /// Bubbles rising around the float
    Bubble,
    /// Thin white marker moving along the bar
    Slider,
    /// "Take" button shown after a successful reel
    TakeIcon,
    /// Target zone inside the bar
    GreenZone,
    /// The float itself, anchoring bubble detection
    Bobber,
}

/// Immutable captured raster of the game window
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    image: Arc<RgbImage>,
    captured_at: Instant,
    window: Rect,
}

impl CaptureFrame {
    pub fn new(image: RgbImage, captured_at: Instant, window: Rect) -> Self {
        Self {
            image: Arc::new(image),
            captured_at,
            window,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Screen rectangle the frame was captured from
    pub fn window(&self) -> Rect {
        self.window
    }

    /// Frame bounds in frame coordinates
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.image.width(), self.image.height())
    }

    /// Map a screen-space region into this frame, clipped to the raster
    pub fn to_frame(&self, region: &Rect) -> Option<Rect> {
        region
            .relative_to(self.window.origin())
            .intersect(&self.bounds())
    }

    pub fn point_to_screen(&self, p: Point) -> Point {
        p.offset(self.window.x, self.window.y)
    }

    pub fn rect_to_screen(&self, r: &Rect) -> Rect {
        r.translate(self.window.x, self.window.y)
    }
}

/// Where a cue was found, in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CueGeometry {
    Box(Rect),
    Point(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionResult {
    pub kind: CueKind,
    pub found: bool,
    pub geometry: Option<CueGeometry>,
    /// Score in [0, 1]; reported for misses too
    pub confidence: f32,
}

impl DetectionResult {
    pub fn not_found(kind: CueKind) -> Self {
        Self {
            kind,
            found: false,
            geometry: None,
            confidence: 0.0,
        }
    }

    pub fn miss_with_score(kind: CueKind, confidence: f32) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            ..Self::not_found(kind)
        }
    }

    pub fn found_box(kind: CueKind, rect: Rect, confidence: f32) -> Self {
        Self {
            kind,
            found: true,
            geometry: Some(CueGeometry::Box(rect)),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn found_point(kind: CueKind, point: Point, confidence: f32) -> Self {
        Self {
            kind,
            found: true,
            geometry: Some(CueGeometry::Point(point)),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Found with at least `threshold` confidence
    pub fn accepted(&self, threshold: f32) -> bool {
        self.found && self.confidence >= threshold
    }

    pub fn rect(&self) -> Option<Rect> {
        match self.geometry? {
            CueGeometry::Box(r) => Some(r),
            CueGeometry::Point(_) => None,
        }
    }

    /// Point location, or the box centre
    pub fn point(&self) -> Option<Point> {
        match self.geometry? {
            CueGeometry::Box(r) => Some(r.center()),
            CueGeometry::Point(p) => Some(p),
        }
    }
}
