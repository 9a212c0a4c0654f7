use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::types::{CaptureError, Frame};

/// File name of the screenshot saved when a script times out
pub const SCREENSHOT_FILENAME: &str = "screenshot.png";

/// Path of the timeout screenshot inside `artifact_dir`
pub fn screenshot_path(artifact_dir: &Path) -> PathBuf {
    artifact_dir.join(SCREENSHOT_FILENAME)
}

/// Save a frame to the specified file in png format.
pub fn save_frame(frame: &Frame, path: &Path) -> Result<(), CaptureError> {
    frame
        .image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| CaptureError {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        "Saved frame {} ({}x{}) to {}",
        frame.sequence,
        frame.width(),
        frame.height(),
        path.display()
    );
    Ok(())
}
