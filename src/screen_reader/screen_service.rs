//! Screen capture service and the latest-frame slot shared with the controller

use anyhow::{Context, Result};
use image::{DynamicImage, RgbaImage};
use parking_lot::Mutex;
use screenshots::Screen;
use std::sync::Arc;
use std::time::Instant;

use super::base::CaptureFrame;
use crate::geometry::Rect;

/// Non-blocking access to the most recent frame
pub trait FrameProvider: Send + Sync {
    fn latest_frame(&self) -> Option<Arc<CaptureFrame>>;
}

/// Holds at most one frame. The lock only covers the `Arc` swap, never detection.
#[derive(Debug, Default)]
pub struct FrameSlot {
    frame: Mutex<Option<Arc<CaptureFrame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame; the previous one is dropped once readers release it
    pub fn publish(&self, frame: CaptureFrame) {
        let frame = Arc::new(frame);
        let previous = self.frame.lock().replace(frame);
        drop(previous);
    }

    pub fn clear(&self) {
        let previous = self.frame.lock().take();
        drop(previous);
    }
}

impl FrameProvider for FrameSlot {
    fn latest_frame(&self) -> Option<Arc<CaptureFrame>> {
        self.frame.lock().clone()
    }
}

/// Service for capturing the game window
#[derive(Debug, Default)]
pub struct ScreenService;

impl ScreenService {
    pub fn new() -> Self {
        Self
    }

    /// Capture the given screen rectangle as an RGB frame
    pub fn capture_window(&self, window: Rect) -> Result<CaptureFrame> {
        if window.is_empty() {
            anyhow::bail!("window rect {:?} is empty", window);
        }
        let screens = Screen::all().context("Failed to get screens")?;

        let screen = screens
            .iter()
            .find(|s| {
                let d = &s.display_info;
                let bounds = Rect::new(d.x, d.y, d.width, d.height);
                bounds.contains_point(window.center())
            })
            .or_else(|| screens.first())
            .context("No screens found")?;

        // capture_area takes coordinates relative to the screen's origin
        let (sx, sy) = (screen.display_info.x, screen.display_info.y);
        let captured_at = Instant::now();
        let shot = screen
            .capture_area(window.x - sx, window.y - sy, window.width, window.height)
            .context("Failed to capture area")?;

        let rgba = RgbaImage::from_raw(shot.width(), shot.height(), shot.to_vec())
            .context("Failed to create image from raw data")?;
        let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

        Ok(CaptureFrame::new(rgb, captured_at, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::thread;

    fn frame(tag: u8) -> CaptureFrame {
        let mut img = RgbImage::new(4, 4);
        img.put_pixel(0, 0, image::Rgb([tag, tag, tag]));
        CaptureFrame::new(img, Instant::now(), Rect::new(0, 0, 4, 4))
    }

    #[test]
    fn test_slot_starts_empty() {
        let slot = FrameSlot::new();
        assert!(slot.latest_frame().is_none());
    }

    #[test]
    fn test_slot_keeps_only_latest() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.publish(frame(2));
        let latest = slot.latest_frame().unwrap();
        assert_eq!(latest.image().get_pixel(0, 0).0, [2, 2, 2]);
        slot.clear();
        assert!(slot.latest_frame().is_none());
    }

    #[test]
    fn test_reader_keeps_its_frame_after_swap() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        let held = slot.latest_frame().unwrap();
        slot.publish(frame(2));
        assert_eq!(held.image().get_pixel(0, 0).0, [1, 1, 1]);
    }

    #[test]
    fn test_concurrent_publish_and_read() {
        let slot = Arc::new(FrameSlot::new());
        let writer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for i in 0..200u32 {
                    slot.publish(frame((i % 250) as u8));
                }
            })
        };
        for _ in 0..200 {
            if let Some(f) = slot.latest_frame() {
                let px = f.image().get_pixel(0, 0).0;
                assert!(px[0] == px[1] && px[1] == px[2], "torn frame");
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_empty_window_rejected() {
        let service = ScreenService::new();
        assert!(service.capture_window(Rect::new(0, 0, 0, 10)).is_err());
    }
}
