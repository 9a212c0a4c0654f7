//! Template matching.
//!
//! Matching runs in two passes over grayscale images. A normalised
//! squared-difference search on 4x downscaled images finds a candidate
//! position, which is refined at full resolution. The candidate is then
//! confirmed by thresholding the absolute difference against the template
//! and eroding away isolated noise.

use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::{MatchError, count_nonzero, erode, threshold_diff};

/// Templates at least this large in both dimensions are searched downscaled
const DOWNSCALE_MIN_TEMPLATE: u32 = 32;
const DOWNSCALE_FACTOR: u32 = 4;
/// Full-resolution search radius around the downscaled candidate
const REFINE_RADIUS: u32 = DOWNSCALE_FACTOR;
const MIN_CERTAINTY: f64 = 0.80;

/// A reference image to look for in frames
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    image: GrayImage,
}

impl Template {
    /// Load a template from an image file. `name` is how failures refer to it.
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
        debug!(
            "Loaded template {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self {
            name: name.into(),
            image,
        })
    }

    /// Build a template from an image already in memory
    pub fn from_gray(name: impl Into<String>, image: GrayImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }
}

/// Top-left corner of the best candidate, in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MatchPosition {
    pub x: u32,
    pub y: u32,
}

/// Result of matching a template against one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Whether the template was found
    pub matched: bool,
    /// Best candidate position, whether or not it matched
    pub position: MatchPosition,
    /// `1 - SQDIFF_NORMED` of the first-pass candidate, between 0 and 1
    pub first_pass_certainty: f64,
}

/// Look for `template` in `frame`.
///
/// `noise_threshold` (0 to 1) is the fraction of the pixel range by which a
/// pixel may differ from the template and still count as matching.
pub fn find_match(
    frame: &GrayImage,
    template: &Template,
    noise_threshold: f64,
) -> Result<MatchResult, MatchError> {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.image.dimensions();
    if tw > fw || th > fh || tw == 0 || th == 0 {
        return Err(MatchError::TemplateTooLarge {
            template: template.name.clone(),
            template_width: tw,
            template_height: th,
            frame_width: fw,
            frame_height: fh,
        });
    }

    let (position, certainty) = if tw >= DOWNSCALE_MIN_TEMPLATE && th >= DOWNSCALE_MIN_TEMPLATE {
        let small_frame = downscale(frame, DOWNSCALE_FACTOR);
        let small_template = downscale(&template.image, DOWNSCALE_FACTOR);
        let (coarse, score) = best_position(
            &small_frame,
            &small_template,
            0..=small_frame.width() - small_template.width(),
            0..=small_frame.height() - small_template.height(),
        );
        let cx = coarse.x * DOWNSCALE_FACTOR;
        let cy = coarse.y * DOWNSCALE_FACTOR;
        let (refined, _) = best_position(
            frame,
            &template.image,
            cx.saturating_sub(REFINE_RADIUS)..=(cx + REFINE_RADIUS).min(fw - tw),
            cy.saturating_sub(REFINE_RADIUS)..=(cy + REFINE_RADIUS).min(fh - th),
        );
        (refined, 1.0 - score)
    } else {
        let (pos, score) = best_position(frame, &template.image, 0..=fw - tw, 0..=fh - th);
        (pos, 1.0 - score)
    };

    let matched = certainty >= MIN_CERTAINTY && confirm(frame, template, position, noise_threshold);
    trace!(
        "find_match '{}': position=({}, {}) certainty={:.3} matched={}",
        template.name, position.x, position.y, certainty, matched
    );
    Ok(MatchResult {
        matched,
        position,
        first_pass_certainty: certainty,
    })
}

/// Average `factor`x`factor` blocks; partial blocks at the edges are dropped
fn downscale(image: &GrayImage, factor: u32) -> GrayImage {
    let width = (image.width() / factor).max(1);
    let height = (image.height() / factor).max(1);
    GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0u32;
        let mut n = 0u32;
        for sy in y * factor..((y + 1) * factor).min(image.height()) {
            for sx in x * factor..((x + 1) * factor).min(image.width()) {
                sum += u32::from(image.get_pixel(sx, sy)[0]);
                n += 1;
            }
        }
        Luma([(sum / n.max(1)) as u8])
    })
}

/// Position with the lowest normalised squared difference within the given
/// ranges of top-left corners
fn best_position(
    frame: &GrayImage,
    template: &GrayImage,
    xs: std::ops::RangeInclusive<u32>,
    ys: std::ops::RangeInclusive<u32>,
) -> (MatchPosition, f64) {
    let template_sq: f64 = template
        .pixels()
        .map(|p| f64::from(p[0]).powi(2))
        .sum();

    let mut best = (MatchPosition { x: *xs.start(), y: *ys.start() }, f64::INFINITY);
    for y in ys {
        for x in xs.clone() {
            let score = sqdiff_normed(frame, template, template_sq, x, y);
            if score < best.1 {
                best = (MatchPosition { x, y }, score);
            }
        }
    }
    (best.0, best.1.clamp(0.0, 1.0))
}

fn sqdiff_normed(frame: &GrayImage, template: &GrayImage, template_sq: f64, x: u32, y: u32) -> f64 {
    let mut diff_sq = 0u64;
    let mut image_sq = 0u64;
    for (tx, ty, t) in template.enumerate_pixels() {
        let i = i64::from(frame.get_pixel(x + tx, y + ty)[0]);
        let d = i64::from(t[0]) - i;
        diff_sq += (d * d) as u64;
        image_sq += (i * i) as u64;
    }
    let denominator = (template_sq * image_sq as f64).sqrt();
    if denominator == 0.0 {
        return if diff_sq == 0 { 0.0 } else { 1.0 };
    }
    diff_sq as f64 / denominator
}

fn confirm(frame: &GrayImage, template: &Template, at: MatchPosition, noise_threshold: f64) -> bool {
    let region = image::imageops::crop_imm(frame, at.x, at.y, template.width(), template.height())
        .to_image();
    let threshold = (noise_threshold.clamp(0.0, 1.0) * 255.0) as u8;
    let diff = erode(&threshold_diff(&region, &template.image, threshold));
    count_nonzero(&diff) == 0
}

/// Resolve a template or mask path given by a script.
///
/// Absolute paths are used as-is; relative ones are looked up in
/// `script_dir` first, then in the working directory.
pub fn resolve_image_path(image: &str, script_dir: &Path) -> PathBuf {
    let path = Path::new(image);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let beside_script = script_dir.join(path);
    if beside_script.exists() {
        beside_script
    } else {
        path.to_path_buf()
    }
}
