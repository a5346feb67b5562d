//! OpenCV plumbing: raster conversion, template loading and template matching

use image::{GrayImage, RgbImage};
use opencv::{
    core::{min_max_loc, no_array, Mat, MatTraitConst, Point as CvPoint, CV_8UC1, CV_8UC3},
    imgcodecs, imgproc,
    prelude::*,
};
use std::path::Path;
use thiserror::Error;

use crate::geometry::Point;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("template {name} could not be loaded from {path}")]
    TemplateMissing { name: String, path: String },
}

/// Convert image::GrayImage to OpenCV Mat
pub fn gray_image_to_mat(img: &GrayImage) -> opencv::Result<Mat> {
    let (width, height) = (img.width() as i32, img.height() as i32);
    let data = img.as_raw();
    let step = width as usize;
    let mat = unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            height,
            width,
            CV_8UC1,
            data.as_ptr() as *mut std::ffi::c_void,
            step,
        )?
    };
    // Own the pixels; `img` keeps the borrowed buffer only for this call
    mat.try_clone()
}

/// Convert image::RgbImage to a 3-channel OpenCV Mat in RGB order
pub fn rgb_image_to_mat(img: &RgbImage) -> opencv::Result<Mat> {
    let (width, height) = (img.width() as i32, img.height() as i32);
    let data = img.as_raw();
    let step = width as usize * 3;
    let mat = unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            height,
            width,
            CV_8UC3,
            data.as_ptr() as *mut std::ffi::c_void,
            step,
        )?
    };
    mat.try_clone()
}

pub fn rgb_to_gray(rgb: &Mat) -> opencv::Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color(rgb, &mut gray, imgproc::COLOR_RGB2GRAY, 0)?;
    Ok(gray)
}

pub fn rgb_to_hsv(rgb: &Mat) -> opencv::Result<Mat> {
    let mut hsv = Mat::default();
    imgproc::cvt_color(rgb, &mut hsv, imgproc::COLOR_RGB2HSV, 0)?;
    Ok(hsv)
}

/// Grayscale reference image
#[derive(Debug)]
pub struct Template {
    name: String,
    mat: Mat,
}

impl Template {
    /// Load a template in grayscale from disk
    pub fn load(name: &str, path: &Path) -> Result<Self, DetectionError> {
        let missing = || DetectionError::TemplateMissing {
            name: name.to_string(),
            path: path.display().to_string(),
        };
        let path_str = path.to_str().ok_or_else(missing)?;
        let mat = imgcodecs::imread(path_str, imgcodecs::IMREAD_GRAYSCALE)?;
        if mat.empty() {
            return Err(missing());
        }
        Ok(Self {
            name: name.to_string(),
            mat,
        })
    }

    pub fn from_gray(name: &str, img: &GrayImage) -> Result<Self, DetectionError> {
        Ok(Self {
            name: name.to_string(),
            mat: gray_image_to_mat(img)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.mat.cols().max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.mat.rows().max(0) as u32
    }

    /// Best `TM_CCOEFF_NORMED` match in `haystack`: top-left and score.
    /// `None` when the template does not fit.
    pub fn best_match(&self, haystack: &Mat) -> opencv::Result<Option<(Point, f64)>> {
        if self.mat.cols() > haystack.cols() || self.mat.rows() > haystack.rows() {
            tracing::trace!("[DETECT] Template '{}' larger than search area, skipping", self.name);
            return Ok(None);
        }

        let mut result = Mat::default();
        imgproc::match_template(
            haystack,
            &self.mat,
            &mut result,
            imgproc::TM_CCOEFF_NORMED,
            &no_array(),
        )?;

        let mut max_val = 0.0;
        let mut max_loc = CvPoint::new(0, 0);
        min_max_loc(
            &result,
            None,
            Some(&mut max_val),
            None,
            Some(&mut max_loc),
            &no_array(),
        )?;

        // flat regions divide by zero in the normalisation
        if !max_val.is_finite() {
            return Ok(None);
        }
        Ok(Some((Point::new(max_loc.x, max_loc.y), max_val)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn pattern(w: u32, h: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([128u8]));
        for dy in 0..5 {
            for dx in 0..5 {
                img.put_pixel(5 + dx, 5 + dy, Luma([(dx * 50 + dy * 40) as u8]));
            }
        }
        img
    }

    #[test]
    fn test_gray_image_to_mat() {
        let mat = gray_image_to_mat(&pattern(10, 12)).unwrap();
        assert_eq!(mat.cols(), 10);
        assert_eq!(mat.rows(), 12);
    }

    #[test]
    fn test_rgb_image_to_mat() {
        let img = RgbImage::from_pixel(7, 3, image::Rgb([1, 2, 3]));
        let mat = rgb_image_to_mat(&img).unwrap();
        assert_eq!(mat.cols(), 7);
        assert_eq!(mat.rows(), 3);
        assert_eq!(mat.channels(), 3);
    }

    #[test]
    fn test_template_best_match() {
        let img = pattern(20, 20);
        let cut = image::imageops::crop_imm(&img, 5, 5, 5, 5).to_image();
        let template = Template::from_gray("cut", &cut).unwrap();
        let haystack = gray_image_to_mat(&img).unwrap();

        let (loc, score) = template.best_match(&haystack).unwrap().unwrap();
        assert!(score > 0.99, "score {} should be > 0.99 for exact match", score);
        assert_eq!(loc, Point::new(5, 5));
    }

    #[test]
    fn test_template_larger_than_haystack() {
        let template = Template::from_gray("big", &pattern(20, 20)).unwrap();
        let haystack = gray_image_to_mat(&pattern(10, 10)).unwrap();
        assert!(template.best_match(&haystack).unwrap().is_none());
    }

    #[test]
    fn test_missing_template_file() {
        let err = Template::load("nope", Path::new("no/such/template.png")).unwrap_err();
        assert!(matches!(err, DetectionError::TemplateMissing { .. } | DetectionError::OpenCv(_)));
    }
}
