//! Cue detection on captured frames
//!
//! Template cues (panel, take icon, bobber) use normalised cross-correlation,
//! the green zone and the slider use HSV masks, bubbles are Hough circles.
//! Every detector is side-effect free; a miss is a `found: false` result and
//! backend errors are downgraded to misses after logging.

use image::imageops;
use opencv::{
    core::{self, Mat, Point as CvPoint, Scalar, Vec3f, Vector},
    imgproc,
    prelude::*,
};
use std::path::Path;

use super::base::{CaptureFrame, CueKind, DetectionResult};
use super::image_service::{rgb_image_to_mat, rgb_to_gray, rgb_to_hsv, DetectionError, Template};
use crate::geometry::{Point, Rect};
use crate::utils::settings::{DetectionSettings, HsvRange};

/// Detection seam used by the controller. Regions are in screen coordinates,
/// results in frame coordinates.
pub trait CueDetector: Send {
    fn detect(&self, frame: &CaptureFrame, region: &Rect, kind: CueKind) -> DetectionResult;

    /// Number of circle-like markers inside `region`
    fn count_circles(&self, frame: &CaptureFrame, region: &Rect) -> usize;

    /// Bubbles are reported when the circle count exceeds `baseline` by the
    /// configured margin. `None` uses the default baseline.
    fn detect_bubbles(
        &self,
        frame: &CaptureFrame,
        region: &Rect,
        baseline: Option<usize>,
    ) -> DetectionResult;
}

/// OpenCV-backed detector with pre-loaded grayscale templates
pub struct FrameDetector {
    settings: DetectionSettings,
    panel: Option<Template>,
    take: Option<Template>,
    bobber: Option<Template>,
}

impl FrameDetector {
    /// Load the configured templates from `reference_dir`. A template that
    /// cannot be loaded leaves its cue permanently not found.
    pub fn load(settings: DetectionSettings, reference_dir: &Path) -> Self {
        let load = |name: &str, file: &str| match Template::load(name, &reference_dir.join(file)) {
            Ok(t) => {
                tracing::info!("[DETECT] Loaded template '{}' ({}x{})", name, t.width(), t.height());
                Some(t)
            }
            Err(e) => {
                tracing::warn!("[DETECT] {}", e);
                None
            }
        };
        let panel = load("panel", &settings.panel_template);
        let take = load("take", &settings.take_template);
        let bobber = load("bobber", &settings.bobber_template);
        Self {
            settings,
            panel,
            take,
            bobber,
        }
    }

    pub fn with_templates(
        settings: DetectionSettings,
        panel: Option<Template>,
        take: Option<Template>,
        bobber: Option<Template>,
    ) -> Self {
        Self {
            settings,
            panel,
            take,
            bobber,
        }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    fn try_detect(
        &self,
        frame: &CaptureFrame,
        area: Rect,
        kind: CueKind,
    ) -> Result<DetectionResult, DetectionError> {
        match kind {
            CueKind::Panel => self.match_template(frame, area, kind, self.panel.as_ref(), self.settings.panel_threshold),
            CueKind::TakeIcon => self.match_template(frame, area, kind, self.take.as_ref(), self.settings.take_threshold),
            CueKind::Bobber => self.match_template(frame, area, kind, self.bobber.as_ref(), self.settings.bobber_threshold),
            CueKind::GreenZone => self.find_green_zone(frame, area),
            CueKind::Slider => self.find_slider(frame, area),
            CueKind::Bubble => {
                let count = self.circles_in(frame, area)?;
                Ok(self.bubble_result(count, None))
            }
        }
    }

    fn match_template(
        &self,
        frame: &CaptureFrame,
        area: Rect,
        kind: CueKind,
        template: Option<&Template>,
        threshold: f32,
    ) -> Result<DetectionResult, DetectionError> {
        let Some(template) = template else {
            return Ok(DetectionResult::not_found(kind));
        };
        let gray = rgb_to_gray(&crop_to_mat(frame, area)?)?;
        let Some((loc, score)) = template.best_match(&gray)? else {
            return Ok(DetectionResult::not_found(kind));
        };
        let score = score as f32;
        tracing::trace!("[DETECT] {:?} '{}' score {:.3}", kind, template.name(), score);

        if score < threshold {
            return Ok(DetectionResult::miss_with_score(kind, score));
        }
        let bbox = Rect::new(area.x + loc.x, area.y + loc.y, template.width(), template.height());
        Ok(DetectionResult::found_box(kind, bbox, score))
    }

    fn mask(&self, frame: &CaptureFrame, area: Rect, range: &HsvRange) -> Result<Mat, DetectionError> {
        let hsv = rgb_to_hsv(&crop_to_mat(frame, area)?)?;
        let mut mask = Mat::default();
        core::in_range(&hsv, &hsv_scalar(range.low), &hsv_scalar(range.high), &mut mask)?;
        Ok(mask)
    }

    fn find_green_zone(&self, frame: &CaptureFrame, area: Rect) -> Result<DetectionResult, DetectionError> {
        let mask = self.mask(frame, area, &self.settings.green_hsv)?;
        let pixels = core::count_non_zero(&mask)?;
        if pixels < self.settings.min_mask_pixels as i32 {
            return Ok(DetectionResult::not_found(CueKind::GreenZone));
        }

        let mut points = Vector::<CvPoint>::new();
        core::find_non_zero(&mask, &mut points)?;
        let r = imgproc::bounding_rect(&points)?;
        let bbox = Rect::new(area.x + r.x, area.y + r.y, r.width.max(0) as u32, r.height.max(0) as u32);

        // fill ratio of the bounding box doubles as the confidence
        let fill = pixels as f32 / bbox.area().max(1) as f32;
        tracing::trace!("[DETECT] GreenZone {:?} fill {:.2}", bbox, fill);
        Ok(DetectionResult::found_box(CueKind::GreenZone, bbox, fill))
    }

    fn find_slider(&self, frame: &CaptureFrame, area: Rect) -> Result<DetectionResult, DetectionError> {
        let mask = self.mask(frame, area, &self.settings.slider_hsv)?;
        let (rows, cols) = (mask.rows().max(0) as usize, mask.cols().max(0) as usize);
        let data = mask.data_bytes()?;

        let mut profile = vec![0u32; cols];
        for row in data.chunks_exact(cols.max(1)).take(rows) {
            for (c, &v) in row.iter().enumerate() {
                if v != 0 {
                    profile[c] += 1;
                }
            }
        }

        match slider_column(&profile, self.settings.min_mask_pixels) {
            Some((centre, occupancy)) => {
                let point = Point::new(area.x + centre.round() as i32, area.y + (rows / 2) as i32);
                let confidence = occupancy as f32 / rows.max(1) as f32;
                tracing::trace!("[DETECT] Slider at x={:.1} occupancy {:.2}", centre, confidence);
                Ok(DetectionResult::found_point(CueKind::Slider, point, confidence))
            }
            None => Ok(DetectionResult::not_found(CueKind::Slider)),
        }
    }

    fn circles_in(&self, frame: &CaptureFrame, area: Rect) -> Result<usize, DetectionError> {
        let gray = rgb_to_gray(&crop_to_mat(frame, area)?)?;
        let mut blurred = Mat::default();
        imgproc::median_blur(&gray, &mut blurred, 3)?;

        let s = &self.settings;
        let mut circles = Vector::<Vec3f>::new();
        imgproc::hough_circles(
            &blurred,
            &mut circles,
            imgproc::HOUGH_GRADIENT,
            s.hough_dp,
            s.hough_min_dist,
            s.hough_canny,
            s.hough_accumulator,
            s.bubble_min_radius,
            s.bubble_max_radius,
        )?;
        Ok(circles.len())
    }

    fn bubble_result(&self, count: usize, baseline: Option<usize>) -> DetectionResult {
        let baseline = baseline.unwrap_or(self.settings.default_bubble_baseline);
        let needed = baseline + self.settings.bubble_margin;
        tracing::trace!("[DETECT] Bubbles: {} circles (need > {})", count, needed);
        if count > needed {
            let confidence = (count - needed) as f32 / (count as f32);
            DetectionResult {
                kind: CueKind::Bubble,
                found: true,
                geometry: None,
                confidence: confidence.clamp(0.0, 1.0),
            }
        } else {
            DetectionResult::not_found(CueKind::Bubble)
        }
    }
}

impl CueDetector for FrameDetector {
    fn detect(&self, frame: &CaptureFrame, region: &Rect, kind: CueKind) -> DetectionResult {
        let Some(area) = frame.to_frame(region) else {
            return DetectionResult::not_found(kind);
        };
        self.try_detect(frame, area, kind).unwrap_or_else(|e| {
            tracing::debug!("[DETECT] {:?} failed: {}", kind, e);
            DetectionResult::not_found(kind)
        })
    }

    fn count_circles(&self, frame: &CaptureFrame, region: &Rect) -> usize {
        let Some(area) = frame.to_frame(region) else {
            return 0;
        };
        self.circles_in(frame, area).unwrap_or_else(|e| {
            tracing::debug!("[DETECT] Circle count failed: {}", e);
            0
        })
    }

    fn detect_bubbles(
        &self,
        frame: &CaptureFrame,
        region: &Rect,
        baseline: Option<usize>,
    ) -> DetectionResult {
        let count = self.count_circles(frame, region);
        self.bubble_result(count, baseline)
    }
}

fn crop_to_mat(frame: &CaptureFrame, area: Rect) -> opencv::Result<Mat> {
    let crop = imageops::crop_imm(frame.image(), area.x as u32, area.y as u32, area.width, area.height).to_image();
    rgb_image_to_mat(&crop)
}

fn hsv_scalar(v: [u8; 3]) -> Scalar {
    Scalar::new(v[0] as f64, v[1] as f64, v[2] as f64, 0.0)
}

/// Marker column from a per-column occupancy profile: the contiguous run of
/// columns above half the peak around the peak, weighted by occupancy.
/// Returns the centre and the peak occupancy.
pub fn slider_column(profile: &[u32], min_pixels: u32) -> Option<(f64, u32)> {
    let (peak_col, &peak) = profile
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;
    let total: u32 = profile.iter().sum();
    if peak == 0 || total < min_pixels {
        return None;
    }

    let above = |c: usize| profile[c] * 2 > peak;
    let mut start = peak_col;
    while start > 0 && above(start - 1) {
        start -= 1;
    }
    let mut end = peak_col;
    while end + 1 < profile.len() && above(end + 1) {
        end += 1;
    }

    let (mut weight, mut sum) = (0.0, 0.0);
    for (c, &v) in profile.iter().enumerate().take(end + 1).skip(start) {
        weight += v as f64;
        sum += v as f64 * c as f64;
    }
    Some((sum / weight, peak))
}
