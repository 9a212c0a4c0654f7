// Core types for frame capture

use image::RgbImage;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A single decoded video frame
///
/// The pixel data is shared, so cloning a frame (e.g. to keep it as a
/// screenshot) does not copy the image.
#[derive(Clone)]
pub struct Frame {
    /// RGB pixel data
    pub image: Arc<RgbImage>,
    /// Position of the frame in the stream, measured from the first frame
    pub timestamp: Duration,
    /// Sequence number, starting at 0
    pub sequence: u64,
}

impl Frame {
    /// Create a new frame
    pub fn new(image: RgbImage, timestamp: Duration, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp,
            sequence,
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("timestamp", &self.timestamp)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Errors raised by a frame source
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source description could not be understood
    #[error("Invalid source pipeline '{description}': {reason}")]
    InvalidDescription { description: String, reason: String },

    /// The source has no more frames and will never produce one again
    #[error("End of stream from {0}")]
    EndOfStream(String),

    /// A frame could not be decoded
    #[error("Failed to decode frame '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub(crate) fn invalid(description: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDescription {
            description: description.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by an output sink
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink description could not be understood
    #[error("Invalid sink pipeline '{description}': {reason}")]
    InvalidDescription { description: String, reason: String },

    /// A frame could not be encoded
    #[error("Failed to write frame '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to persist a diagnostic artifact
#[derive(Debug, Error)]
#[error("Failed to save '{path}': {source}")]
pub struct CaptureError {
    /// Destination that could not be written
    pub path: PathBuf,
    #[source]
    pub source: image::ImageError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clone_shares_pixels() {
        let frame = Frame::new(RgbImage::new(4, 2), Duration::from_millis(40), 1);
        let copy = frame.clone();
        assert!(Arc::ptr_eq(&frame.image, &copy.image));
        assert_eq!(copy.width(), 4);
        assert_eq!(copy.height(), 2);
    }

    #[test]
    fn test_frame_debug_omits_pixels() {
        let frame = Frame::new(RgbImage::new(320, 240), Duration::ZERO, 7);
        let debug = format!("{:?}", frame);
        assert!(debug.contains("width: 320"));
        assert!(debug.contains("sequence: 7"));
        assert!(debug.len() < 200);
    }
}
