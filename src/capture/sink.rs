//! Output sinks receiving every frame the harness pulls from the source.

use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::pipeline::ElementDescription;
use super::types::{Frame, SinkError};

/// Trait for output sinks
pub trait FrameSink {
    /// Consume one frame
    fn push(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Sink type identifier (e.g. "fakesink")
    fn sink_type(&self) -> &str;

    /// Flush and close the sink
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Open a sink from its description
pub fn open_sink(description: &str) -> Result<Box<dyn FrameSink>, SinkError> {
    let invalid = |reason: String| SinkError::InvalidDescription {
        description: description.to_string(),
        reason,
    };
    let desc = ElementDescription::parse(description).map_err(invalid)?;

    let sink: Box<dyn FrameSink> = match desc.name.as_str() {
        "fakesink" => {
            desc.check_known(&["sync"]).map_err(invalid)?;
            Box::new(NullSink::default())
        }
        "multifilesink" => {
            desc.check_known(&["location"]).map_err(invalid)?;
            let location = desc.require_path("location").map_err(invalid)?;
            Box::new(DirectorySink::create(location)?)
        }
        other => {
            return Err(invalid(format!(
                "unknown sink element '{}' (supported: fakesink, multifilesink)",
                other
            )));
        }
    };

    debug!("Opened {} sink: {}", sink.sink_type(), description);
    Ok(sink)
}

/// Discards frames, counting them
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    /// Number of frames pushed so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for NullSink {
    fn push(&mut self, _frame: &Frame) -> Result<(), SinkError> {
        self.frames += 1;
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "fakesink"
    }
}

/// Writes each frame as `frame_NNNNNN.png` into a directory
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: u64,
}

impl DirectorySink {
    /// Create the directory (if needed) and the sink writing into it
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    /// Directory frames are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for frame `sequence`
    pub fn frame_path(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", sequence))
    }
}

impl FrameSink for DirectorySink {
    fn push(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let path = self.frame_path(frame.sequence);
        frame
            .image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|source| SinkError::Encode { path, source })?;
        self.written += 1;
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "multifilesink"
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        debug!(
            "multifilesink: wrote {} frames to {}",
            self.written,
            self.dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::time::Duration;

    #[test]
    fn test_open_sinks() {
        assert_eq!(open_sink("fakesink").unwrap().sink_type(), "fakesink");
        assert_eq!(open_sink("fakesink sync=false").unwrap().sink_type(), "fakesink");
        assert!(matches!(
            open_sink("xvimagesink"),
            Err(SinkError::InvalidDescription { .. })
        ));
        assert!(open_sink("multifilesink").is_err());
    }

    #[test]
    fn test_null_sink_counts() {
        let mut sink = NullSink::default();
        let frame = Frame::new(RgbImage::new(2, 2), Duration::ZERO, 0);
        sink.push(&frame).unwrap();
        sink.push(&frame).unwrap();
        assert_eq!(sink.frames(), 2);
    }

    #[test]
    fn test_directory_sink_writes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let mut sink = open_sink(&format!("multifilesink location={}", out.display())).unwrap();

        let frame = Frame::new(RgbImage::new(4, 3), Duration::from_millis(80), 2);
        sink.push(&frame).unwrap();
        sink.finish().unwrap();

        let written = image::open(out.join("frame_000002.png")).unwrap();
        assert_eq!((written.width(), written.height()), (4, 3));
    }
}
