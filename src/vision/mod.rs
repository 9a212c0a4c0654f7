//! Image analysis used by the capability API: template matching and motion
//! detection on grayscale frames.

pub mod matching;
pub mod motion;

use image::{GrayImage, Luma, RgbImage};
use std::path::PathBuf;
use thiserror::Error;

pub use matching::{MatchPosition, MatchResult, Template, find_match};
pub use motion::{Mask, MotionDetector};

/// Errors raised while preparing or running an image analysis
#[derive(Debug, Error)]
pub enum MatchError {
    /// Template or mask file doesn't exist
    #[error("No such file: {}", .0.display())]
    NotFound(PathBuf),

    /// Template or mask could not be decoded
    #[error("Failed to load image '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Template doesn't fit in the frame
    #[error("Template '{template}' ({template_width}x{template_height}) is larger than the frame ({frame_width}x{frame_height})")]
    TemplateTooLarge {
        template: String,
        template_width: u32,
        template_height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    /// Mask and frame dimensions differ
    #[error("Mask '{mask}' ({mask_width}x{mask_height}) doesn't match the frame size ({frame_width}x{frame_height})")]
    MaskSize {
        mask: String,
        mask_width: u32,
        mask_height: u32,
        frame_width: u32,
        frame_height: u32,
    },
}

/// Convert a frame to grayscale
pub fn to_gray(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Pixels whose absolute difference exceeds `threshold` become 255, others 0
pub(crate) fn threshold_diff(a: &GrayImage, b: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let diff = a.get_pixel(x, y)[0].abs_diff(b.get_pixel(x, y)[0]);
        Luma([if diff > threshold { 255 } else { 0 }])
    })
}

/// Erode a binary image with a 3x3 square kernel.
///
/// Neighbours outside the image don't erode, so a 3x3 block touching the
/// border survives.
pub(crate) fn erode(binary: &GrayImage) -> GrayImage {
    let (width, height) = binary.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let x0 = x.saturating_sub(1);
        let y0 = y.saturating_sub(1);
        let x1 = (x + 1).min(width - 1);
        let y1 = (y + 1).min(height - 1);
        let all_set = (y0..=y1).all(|ny| (x0..=x1).all(|nx| binary.get_pixel(nx, ny)[0] != 0));
        Luma([if all_set { 255 } else { 0 }])
    })
}

pub(crate) fn count_nonzero(image: &GrayImage) -> usize {
    image.pixels().filter(|p| p[0] != 0).count()
}
