//! Typed geometry shared by the memory reader, region calculator and detectors

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Integer point in screen or frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Axis-aligned rectangle with a top-left origin and a non-negative extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Create from corner coordinates (x1, y1, x2, y2); inverted corners give an empty rect
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0) as u32,
            height: (y2 - y1).max(0) as u32,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// Horizontal centre with sub-pixel precision
    pub fn center_x(&self) -> f64 {
        self.x as f64 + self.width as f64 / 2.0
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlap of two rectangles, `None` when they do not overlap
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        let r = Rect::from_corners(x1, y1, x2, y2);
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    /// Same rectangle expressed relative to `origin`
    pub fn relative_to(&self, origin: Point) -> Rect {
        Rect::new(self.x - origin.x, self.y - origin.y, self.width, self.height)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// 3D vector as read from the target process (single precision on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Wrap an angle in radians into [-π, π]
pub fn wrap_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let mut a = (angle + PI) % (2.0 * PI);
    if a < 0.0 {
        a += 2.0 * PI;
    }
    a - PI
}

/// Shortest signed difference `current - previous`, in [-π, π]
pub fn angle_delta(previous: f64, current: f64) -> f64 {
    wrap_angle(current - previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_from_corners() {
        let r = Rect::from_corners(100, 200, 500, 600);
        assert_eq!(r, Rect::new(100, 200, 400, 400));
        assert_eq!(r.right(), 500);
        assert_eq!(r.bottom(), 600);
        assert!(Rect::from_corners(10, 10, 5, 5).is_empty());
    }

    #[test]
    fn test_intersect_and_contains() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 50, 100, 100);
        assert_eq!(a.intersect(&b), Some(Rect::new(50, 50, 50, 50)));
        assert!(a.intersect(&Rect::new(200, 200, 10, 10)).is_none());
        assert!(a.contains_rect(&Rect::new(10, 10, 90, 90)));
        assert!(!a.contains_rect(&b));
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-9 || (wrap_angle(3.0 * PI) + PI).abs() < 1e-9);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_angle(-0.5 - 2.0 * PI) + 0.5).abs() < 1e-9);
        assert_eq!(wrap_angle(f64::NAN), 0.0);
    }

    #[test]
    fn test_angle_delta_across_seam() {
        let d = angle_delta(3.1, -3.1);
        assert!(d > 0.0 && d < 0.1, "delta {} should be a small positive step", d);
        let d = angle_delta(-3.1, 3.1);
        assert!(d < 0.0 && d > -0.1, "delta {} should be a small negative step", d);
    }
}
