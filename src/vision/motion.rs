//! Motion detection between consecutive frames.

use image::{GrayImage, RgbImage};
use std::path::Path;
use tracing::trace;

use super::{MatchError, count_nonzero, erode, threshold_diff, to_gray};

/// Grayscale difference above which a pixel counts as changed
const MOTION_THRESHOLD: u8 = 25;

/// Region of the frame to observe: white pixels are observed, black ignored
#[derive(Debug, Clone)]
pub struct Mask {
    name: String,
    image: GrayImage,
}

impl Mask {
    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self, MatchError> {
        if !path.exists() {
            return Err(MatchError::NotFound(path.to_path_buf()));
        }
        let image = image::open(path)
            .map_err(|source| MatchError::Load {
                path: path.to_path_buf(),
                source,
            })?
            .to_luma8();
        Ok(Self {
            name: name.into(),
            image,
        })
    }

    pub fn from_gray(name: impl Into<String>, image: GrayImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    fn observes(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y)[0] >= 128
    }
}

/// Compares each frame with the one before it
#[derive(Debug, Default)]
pub struct MotionDetector {
    previous: Option<GrayImage>,
    mask: Option<Mask>,
}

impl MotionDetector {
    pub fn new(mask: Option<Mask>) -> Self {
        Self {
            previous: None,
            mask,
        }
    }

    /// Feed the next frame. Returns whether it moved relative to the previous
    /// frame; the first frame never counts as motion.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<bool, MatchError> {
        let gray = to_gray(frame);
        if let Some(mask) = &self.mask {
            if mask.image.dimensions() != gray.dimensions() {
                return Err(MatchError::MaskSize {
                    mask: mask.name.clone(),
                    mask_width: mask.image.width(),
                    mask_height: mask.image.height(),
                    frame_width: gray.width(),
                    frame_height: gray.height(),
                });
            }
        }

        let previous = match self.previous.take() {
            Some(previous) if previous.dimensions() == gray.dimensions() => previous,
            // First frame, or the resolution changed mid-stream
            _ => {
                self.previous = Some(gray);
                return Ok(false);
            }
        };

        let mut changed = threshold_diff(&previous, &gray, MOTION_THRESHOLD);
        self.previous = Some(gray);
        if let Some(mask) = &self.mask {
            for (x, y, pixel) in changed.enumerate_pixels_mut() {
                if !mask.observes(x, y) {
                    pixel[0] = 0;
                }
            }
        }
        let moved = count_nonzero(&erode(&changed));
        trace!("motion: {} changed pixels after erosion", moved);
        Ok(moved > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TestPattern;
    use crate::capture::pattern::fill_rect;
    use image::Luma;

    #[test]
    fn test_static_pattern_has_no_motion() {
        let mut detector = MotionDetector::new(None);
        for seq in 0..3 {
            let frame = TestPattern::Smpte.render(64, 48, seq);
            assert!(!detector.detect(&frame).unwrap());
        }
    }

    #[test]
    fn test_animated_pattern_moves() {
        let mut detector = MotionDetector::new(None);
        assert!(!detector.detect(&TestPattern::Blink.render(32, 24, 0)).unwrap());
        assert!(detector.detect(&TestPattern::Blink.render(32, 24, 1)).unwrap());
        assert!(detector.detect(&TestPattern::Blink.render(32, 24, 2)).unwrap());
    }

    #[test]
    fn test_mask_hides_motion() {
        let make = |on: bool| {
            let mut img = TestPattern::Black.render(40, 40, 0);
            if on {
                fill_rect(&mut img, 30, 30, 8, 8, [255, 255, 255]);
            }
            img
        };

        // Observe only the left half; the change happens on the right
        let mut mask = GrayImage::new(40, 40);
        for y in 0..40 {
            for x in 0..20 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let mut detector = MotionDetector::new(Some(Mask::from_gray("left", mask)));
        assert!(!detector.detect(&make(false)).unwrap());
        assert!(!detector.detect(&make(true)).unwrap());

        let mut unmasked = MotionDetector::new(None);
        assert!(!unmasked.detect(&make(false)).unwrap());
        assert!(unmasked.detect(&make(true)).unwrap());
    }

    #[test]
    fn test_mask_size_mismatch() {
        let mut detector = MotionDetector::new(Some(Mask::from_gray("small", GrayImage::new(4, 4))));
        let err = detector.detect(&TestPattern::Black.render(8, 8, 0)).unwrap_err();
        assert!(matches!(err, MatchError::MaskSize { .. }));
    }
}
