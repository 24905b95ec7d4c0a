use opencv::{
    core::{self, Mat, Point, Scalar, Size},
    imgproc,
    prelude::*,
};
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::roi::RoiError;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("frame sizes differ: previous {prev:?}, current {curr:?}")]
    FrameMismatch { prev: Size, curr: Size },
    #[error("frame layouts differ: previous type {prev}, current type {curr}")]
    LayoutMismatch { prev: i32, curr: i32 },
    #[error("mask size {mask:?} does not match frame size {frame:?}")]
    MaskMismatch { mask: Size, frame: Size },
    #[error("mask selects no pixels")]
    EmptyMask,
    #[error("failed to build mask: {0}")]
    Mask(#[from] RoiError),
    #[error("opencv error: {0}")]
    Cv(#[from] opencv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionScore {
    /// Sum of denoised changed pixel values over the ROI pixel count.
    pub ratio: f64,
    pub changed_pixels: i32,
    pub roi_pixels: i32,
}

pub struct FrameDiffer {
    diff_cutoff: u8,
    threshold: f64,
    kernel: Mat,
}

impl FrameDiffer {
    pub fn new(config: &AnalysisConfig) -> opencv::Result<Self> {
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            Size::new(config.kernel_size, config.kernel_size),
            Point::new(-1, -1),
        )?;

        Ok(Self {
            diff_cutoff: config.diff_cutoff,
            threshold: config.threshold,
            kernel,
        })
    }

    pub fn score(&self, prev: &Mat, curr: &Mat, mask: &Mat) -> Result<MotionScore, ScoreError> {
        let frame_size = curr.size()?;
        if prev.size()? != frame_size {
            return Err(ScoreError::FrameMismatch {
                prev: prev.size()?,
                curr: frame_size,
            });
        }
        if prev.typ() != curr.typ() {
            return Err(ScoreError::LayoutMismatch {
                prev: prev.typ(),
                curr: curr.typ(),
            });
        }
        if mask.size()? != frame_size {
            return Err(ScoreError::MaskMismatch {
                mask: mask.size()?,
                frame: frame_size,
            });
        }

        let roi_pixels = core::count_non_zero(mask)?;
        if roi_pixels == 0 {
            return Err(ScoreError::EmptyMask);
        }

        let prev_gray = masked_luma(prev, mask)?;
        let curr_gray = masked_luma(curr, mask)?;

        let mut diff = Mat::default();
        core::absdiff(&prev_gray, &curr_gray, &mut diff)?;

        // THRESH_BINARY keeps values strictly above the threshold.
        let mut changed = Mat::default();
        imgproc::threshold(
            &diff,
            &mut changed,
            f64::from(self.diff_cutoff) - 1.0,
            255.0,
            imgproc::THRESH_BINARY,
        )?;

        let mut opened = Mat::default();
        imgproc::morphology_ex(
            &changed,
            &mut opened,
            imgproc::MORPH_OPEN,
            &self.kernel,
            Point::new(-1, -1),
            1,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;

        let changed_pixels = core::count_non_zero(&opened)?;
        let changed_sum = core::sum_elems(&opened)?[0];

        Ok(MotionScore {
            ratio: changed_sum / f64::from(roi_pixels),
            changed_pixels,
            roi_pixels,
        })
    }

    pub fn is_motion(&self, score: &MotionScore) -> bool {
        score.ratio > self.threshold
    }
}

fn masked_luma(frame: &Mat, mask: &Mat) -> opencv::Result<Mat> {
    let mut masked = Mat::default();
    core::bitwise_and(frame, frame, &mut masked, mask)?;

    if masked.channels() == 1 {
        return Ok(masked);
    }

    let mut gray = Mat::default();
    imgproc::cvt_color(&masked, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    Ok(gray)
}
