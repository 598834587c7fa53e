//! Skew estimation by hill-climbing a staff-line sharpness score.
//!
//! Every candidate angle rotates the *original* intensity image about its
//! centre (bilinear, background filled white) and re-binarizes it, so error
//! never accumulates across attempts.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::{debug, info};

use crate::config::DeskewConfig;
use crate::geometry::{project, Axis};
use crate::raster::Bitmap;

/// Sum of row-projection values at every upward crossing of `threshold`.
///
/// A crossing is a row above the threshold whose predecessor is below it;
/// sharp horizontal lines produce tall single rows and score highest.
pub fn line_strength(histogram: &[u32], threshold: u32) -> u64 {
    histogram
        .windows(2)
        .filter(|w| w[1] > threshold && w[0] < threshold)
        .map(|w| w[1] as u64)
        .sum()
}

/// Rotate an intensity image by `degrees` about its centre.
pub fn rotate(gray: &GrayImage, degrees: f64) -> GrayImage {
    rotate_about_center(
        gray,
        degrees.to_radians() as f32,
        Interpolation::Bilinear,
        Luma([255u8]),
    )
}

/// Result of a deskew run.
#[derive(Debug, Clone)]
pub struct Deskewed {
    /// Rotation applied to the input, in degrees
    pub angle: f64,
    pub bitmap: Bitmap,
}

pub struct Deskewer {
    step: f64,
    max: f64,
    line_threshold: Option<u32>,
    binarize_threshold: u8,
}

/// Best score reached while climbing in one direction, with the run of
/// angles that tied for it.
struct Climb {
    score: u64,
    from: f64,
    to: f64,
}

impl Climb {
    fn angle(&self) -> f64 {
        (self.from + self.to) / 2.0
    }
}

impl Deskewer {
    pub fn new(config: &DeskewConfig, binarize_threshold: u8) -> Self {
        Self {
            step: config.step_degrees.abs(),
            max: config.max_degrees.abs(),
            line_threshold: config.line_threshold,
            binarize_threshold,
        }
    }

    fn score(&self, gray: &GrayImage, degrees: f64, threshold: u32) -> u64 {
        let rotated = rotate(gray, degrees);
        let bitmap = Bitmap::from_gray(&rotated, self.binarize_threshold);
        line_strength(&project(&bitmap, Axis::Rows), threshold)
    }

    /// Walk away from zero in one direction while the score does not drop.
    ///
    /// When several consecutive angles share the best score the middle of
    /// that run is kept.
    fn climb(&self, gray: &GrayImage, base: u64, sign: f64, threshold: u32) -> Climb {
        let mut best = Climb {
            score: base,
            from: 0.0,
            to: 0.0,
        };
        if self.step <= 0.0 {
            return best;
        }
        let mut k = 1u32;
        loop {
            let angle = sign * self.step * k as f64;
            if angle.abs() > self.max + 1e-9 {
                break;
            }
            let score = self.score(gray, angle, threshold);
            debug!(angle, score, "deskew angle tried");
            if score < best.score {
                break;
            }
            if score > best.score {
                best = Climb {
                    score,
                    from: angle,
                    to: angle,
                };
            } else if best.score > base {
                best.to = angle;
            }
            k += 1;
        }
        best
    }

    /// Estimate the corrective rotation for an intensity image.
    pub fn estimate(&self, gray: &GrayImage) -> f64 {
        let threshold = self.line_threshold.unwrap_or(gray.width() / 2);
        let start = Bitmap::from_gray(gray, self.binarize_threshold);
        let base = line_strength(&project(&start, Axis::Rows), threshold);

        let positive = self.climb(gray, base, 1.0, threshold);
        let negative = self.climb(gray, base, -1.0, threshold);
        if negative.score > positive.score {
            negative.angle()
        } else {
            positive.angle()
        }
    }

    /// Straighten an intensity image and binarize the result.
    pub fn deskew(&self, gray: &GrayImage) -> Deskewed {
        let angle = self.estimate(gray);
        info!(angle, "image straightened");
        let bitmap = if angle == 0.0 {
            Bitmap::from_gray(gray, self.binarize_threshold)
        } else {
            Bitmap::from_gray(&rotate(gray, angle), self.binarize_threshold)
        };
        Deskewed { angle, bitmap }
    }
}
