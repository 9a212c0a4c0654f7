//! Frame sources.
//!
//! A source yields the video frames the harness examines:
//! - `VideoTestSource` renders synthetic `videotestsrc` patterns
//! - `MultiFileSource` replays a directory of PNG files

use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::pattern::{TestPattern, draw_time_overlay};
use super::pipeline::ElementDescription;
use super::types::{Frame, SourceError};

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const DEFAULT_FRAMERATE: u32 = 25;

/// Trait for frame sources
pub trait FrameSource {
    /// Pull the next frame.
    ///
    /// Returns `Ok(None)` when no frame is currently available (e.g. loss of
    /// signal); the caller may try again. Implementations must not return
    /// `Ok(None)` without having waited for roughly one frame interval.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Source type identifier (e.g. "videotestsrc")
    fn source_type(&self) -> &str;

    /// Handle for switching test patterns, if this source renders them
    fn pattern_handle(&self) -> Option<PatternHandle> {
        None
    }

    /// Stop producing frames. Further pulls fail with `EndOfStream`.
    fn stop(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Start producing frames again after `stop`, as if freshly opened.
    ///
    /// Timestamps and sequence numbers carry on from before the restart.
    fn restart(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Shared selector for the pattern shown by a `VideoTestSource`.
///
/// The `test` remote control holds a clone and changes the picture on
/// key presses.
#[derive(Debug, Clone)]
pub struct PatternHandle(Arc<AtomicU8>);

impl PatternHandle {
    pub fn new(pattern: TestPattern) -> Self {
        Self(Arc::new(AtomicU8::new(pattern.index())))
    }

    pub fn set(&self, pattern: TestPattern) {
        self.0.store(pattern.index(), Ordering::Relaxed);
    }

    pub fn get(&self) -> TestPattern {
        TestPattern::from_index(self.0.load(Ordering::Relaxed)).unwrap_or(TestPattern::Smpte)
    }
}

/// Open a source from its description
pub fn open_source(description: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    let desc = ElementDescription::parse(description)
        .map_err(|reason| SourceError::invalid(description, reason))?;

    let source: Box<dyn FrameSource> = match desc.name.as_str() {
        "videotestsrc" => Box::new(
            VideoTestSource::from_description(&desc)
                .map_err(|reason| SourceError::invalid(description, reason))?,
        ),
        "multifilesrc" => {
            let config = MultiFileConfig::from_description(&desc)
                .map_err(|reason| SourceError::invalid(description, reason))?;
            Box::new(MultiFileSource::open(config)?)
        }
        other => {
            return Err(SourceError::invalid(
                description,
                format!("unknown source element '{}' (supported: videotestsrc, multifilesrc)", other),
            ));
        }
    };

    debug!("Opened {} source: {}", source.source_type(), description);
    Ok(source)
}

/// Timestamp of frame `sequence` at `framerate` frames per second
fn frame_timestamp(sequence: u64, framerate: u32) -> Duration {
    Duration::from_nanos(sequence.saturating_mul(1_000_000_000) / u64::from(framerate.max(1)))
}

fn frame_interval(framerate: u32) -> Duration {
    frame_timestamp(1, framerate)
}

/// Paces a live source to wall-clock time
#[derive(Debug, Default)]
struct Clock {
    started: Option<Instant>,
    base: Duration,
}

impl Clock {
    /// Pace from scratch, with the frame at `timestamp` due immediately
    fn resume_at(timestamp: Duration) -> Self {
        Self {
            started: None,
            base: timestamp,
        }
    }

    fn wait_until(&mut self, timestamp: Duration) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + timestamp.saturating_sub(self.base);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}

/// Synthetic source rendering `videotestsrc` patterns
#[derive(Debug)]
pub struct VideoTestSource {
    width: u32,
    height: u32,
    framerate: u32,
    live: bool,
    num_buffers: Option<u64>,
    time_overlay: bool,
    pattern: PatternHandle,
    sequence: u64,
    /// Sequence number of the first frame since the last (re)start
    first_sequence: u64,
    clock: Clock,
    stopped: bool,
}

impl VideoTestSource {
    /// Create a non-live source of the given size showing `pattern`
    pub fn new(width: u32, height: u32, pattern: TestPattern) -> Self {
        Self {
            width,
            height,
            framerate: DEFAULT_FRAMERATE,
            live: false,
            num_buffers: None,
            time_overlay: false,
            pattern: PatternHandle::new(pattern),
            sequence: 0,
            first_sequence: 0,
            clock: Clock::default(),
            stopped: false,
        }
    }

    /// Set frames per second
    pub fn framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate.max(1);
        self
    }

    /// Pace frames to wall-clock time
    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Stop producing frames (loss of signal) after `n` frames
    pub fn num_buffers(mut self, n: u64) -> Self {
        self.num_buffers = Some(n);
        self
    }

    /// Burn the stream time into each frame
    pub fn time_overlay(mut self, enabled: bool) -> Self {
        self.time_overlay = enabled;
        self
    }

    fn from_description(desc: &ElementDescription) -> Result<Self, String> {
        desc.check_known(&[
            "pattern",
            "width",
            "height",
            "framerate",
            "is-live",
            "num-buffers",
            "timeoverlay",
        ])?;

        let index = desc.get_u32("pattern", 0)?;
        let pattern = u8::try_from(index)
            .ok()
            .and_then(TestPattern::from_index)
            .ok_or_else(|| format!("pattern must be 0 to 20, got {}", index))?;

        let width = desc.get_u32("width", DEFAULT_WIDTH)?;
        let height = desc.get_u32("height", DEFAULT_HEIGHT)?;
        if width == 0 || height == 0 {
            return Err("width and height must be non-zero".to_string());
        }
        let framerate = desc.get_u32("framerate", DEFAULT_FRAMERATE)?;
        if framerate == 0 {
            return Err("framerate must be non-zero".to_string());
        }

        let mut source = Self::new(width, height, pattern)
            .framerate(framerate)
            .live(desc.get_bool("is-live", false)?)
            .time_overlay(desc.get_bool("timeoverlay", false)?);
        if let Some(n) = desc.get_opt_u64("num-buffers")? {
            source = source.num_buffers(n);
        }
        Ok(source)
    }
}

impl FrameSource for VideoTestSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.stopped {
            return Err(SourceError::EndOfStream(self.source_type().to_string()));
        }

        if self
            .num_buffers
            .is_some_and(|n| self.sequence - self.first_sequence >= n)
        {
            // No signal: wait a frame interval so callers don't spin
            std::thread::sleep(frame_interval(self.framerate));
            trace!("videotestsrc: no signal after {} buffers", self.sequence);
            return Ok(None);
        }

        let timestamp = frame_timestamp(self.sequence, self.framerate);
        if self.live {
            self.clock.wait_until(timestamp);
        }

        let mut image = self
            .pattern
            .get()
            .render(self.width, self.height, self.sequence);
        if self.time_overlay {
            draw_time_overlay(&mut image, timestamp);
        }

        let frame = Frame::new(image, timestamp, self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn source_type(&self) -> &str {
        "videotestsrc"
    }

    fn pattern_handle(&self) -> Option<PatternHandle> {
        Some(self.pattern.clone())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        self.stopped = true;
        Ok(())
    }

    /// `num-buffers` counts again from the restart
    fn restart(&mut self) -> Result<(), SourceError> {
        self.first_sequence = self.sequence;
        self.clock = Clock::resume_at(frame_timestamp(self.sequence, self.framerate));
        self.stopped = false;
        Ok(())
    }
}

/// Configuration for replaying a directory of images
#[derive(Debug, Clone)]
pub struct MultiFileConfig {
    /// Directory holding the PNG frames
    pub location: PathBuf,
    /// Frames per second
    pub framerate: u32,
    /// Start again from the first file after the last one
    pub looping: bool,
    /// Pace frames to wall-clock time
    pub live: bool,
}

impl MultiFileConfig {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            framerate: DEFAULT_FRAMERATE,
            looping: true,
            live: false,
        }
    }

    fn from_description(desc: &ElementDescription) -> Result<Self, String> {
        desc.check_known(&["location", "framerate", "loop", "is-live"])?;
        let framerate = desc.get_u32("framerate", DEFAULT_FRAMERATE)?;
        if framerate == 0 {
            return Err("framerate must be non-zero".to_string());
        }
        Ok(Self {
            location: desc.require_path("location")?,
            framerate,
            looping: desc.get_bool("loop", true)?,
            live: desc.get_bool("is-live", false)?,
        })
    }
}

/// Source replaying the PNG files of a directory in name order
#[derive(Debug)]
pub struct MultiFileSource {
    config: MultiFileConfig,
    files: Vec<PathBuf>,
    decoded: Vec<Option<Arc<RgbImage>>>,
    position: usize,
    sequence: u64,
    clock: Clock,
    stopped: bool,
}

impl MultiFileSource {
    /// Open the directory and index its PNG files
    pub fn open(config: MultiFileConfig) -> Result<Self, SourceError> {
        let files = index_frames(&config.location)?;
        Ok(Self {
            decoded: vec![None; files.len()],
            files,
            config,
            position: 0,
            sequence: 0,
            clock: Clock::default(),
            stopped: false,
        })
    }

    fn load(&mut self, index: usize) -> Result<Arc<RgbImage>, SourceError> {
        if let Some(image) = &self.decoded[index] {
            return Ok(Arc::clone(image));
        }
        let path = &self.files[index];
        let image = image::open(path)
            .map_err(|source| SourceError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        let image = Arc::new(image);
        self.decoded[index] = Some(Arc::clone(&image));
        Ok(image)
    }
}

impl FrameSource for MultiFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.stopped {
            return Err(SourceError::EndOfStream(self.source_type().to_string()));
        }
        if self.position >= self.files.len() {
            if !self.config.looping {
                return Err(SourceError::EndOfStream(
                    self.config.location.display().to_string(),
                ));
            }
            self.position = 0;
        }

        let timestamp = frame_timestamp(self.sequence, self.config.framerate);
        if self.config.live {
            self.clock.wait_until(timestamp);
        }

        let image = self.load(self.position)?;
        let frame = Frame {
            image,
            timestamp,
            sequence: self.sequence,
        };
        self.position += 1;
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn source_type(&self) -> &str {
        "multifilesrc"
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        self.stopped = true;
        Ok(())
    }

    /// Re-read the directory and replay it from the first file
    fn restart(&mut self) -> Result<(), SourceError> {
        self.files = index_frames(&self.config.location)?;
        self.decoded = vec![None; self.files.len()];
        self.position = 0;
        self.clock = Clock::resume_at(frame_timestamp(self.sequence, self.config.framerate));
        self.stopped = false;
        Ok(())
    }
}

fn index_frames(location: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let files = list_png_files(location)?;
    if files.is_empty() {
        return Err(SourceError::invalid(
            &location.display().to_string(),
            "directory contains no .png files",
        ));
    }
    debug!("multifilesrc: {} frames in {}", files.len(), location.display());
    Ok(files)
}

/// List all PNG files in a directory, sorted by name
fn list_png_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if path.is_file() && is_png {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timestamps() {
        assert_eq!(frame_timestamp(0, 25), Duration::ZERO);
        assert_eq!(frame_timestamp(25, 25), Duration::from_secs(1));
        assert_eq!(frame_interval(5), Duration::from_millis(200));
    }

    #[test]
    fn test_open_videotestsrc() {
        let mut source =
            open_source("videotestsrc pattern=4 width=16 height=8 framerate=10").unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 8));
        assert_eq!(frame.image.get_pixel(0, 0).0, [255, 0, 0]);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.timestamp, Duration::from_millis(100));
    }

    #[test]
    fn test_open_rejects_bad_descriptions() {
        assert!(matches!(
            open_source("v4l2src device=/dev/video0"),
            Err(SourceError::InvalidDescription { .. })
        ));
        assert!(open_source("videotestsrc pattern=21").is_err());
        assert!(open_source("videotestsrc colour=red").is_err());
        assert!(open_source("videotestsrc framerate=0").is_err());
        assert!(open_source("multifilesrc").is_err());
    }

    #[test]
    fn test_pattern_handle_switches_picture() {
        let mut source = VideoTestSource::new(8, 8, TestPattern::Black);
        let handle = source.pattern_handle().unwrap();
        handle.set(TestPattern::White);
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.image.get_pixel(3, 3).0, [255, 255, 255]);
        assert_eq!(handle.get(), TestPattern::White);
    }

    #[test]
    fn test_num_buffers_reports_no_signal() {
        let mut source = VideoTestSource::new(8, 8, TestPattern::Black)
            .framerate(1000)
            .num_buffers(1);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_restart_resets_num_buffers() {
        let mut source = VideoTestSource::new(8, 8, TestPattern::Black)
            .framerate(1000)
            .num_buffers(2);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());

        source.stop().unwrap();
        source.restart().unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.timestamp, Duration::from_millis(2));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_stopped_source_fails() {
        let mut source = VideoTestSource::new(8, 8, TestPattern::Black);
        source.stop().unwrap();
        assert!(matches!(source.next_frame(), Err(SourceError::EndOfStream(_))));
    }

    #[test]
    fn test_multifilesrc_replays_in_order() {
        let dir = tempfile::tempdir().unwrap();
        TestPattern::Red.render(4, 4, 0).save(dir.path().join("b.png")).unwrap();
        TestPattern::Blue.render(4, 4, 0).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config = MultiFileConfig::new(dir.path());
        let mut source = MultiFileSource::open(config).unwrap();
        let colors: Vec<[u8; 3]> = (0..3)
            .map(|_| source.next_frame().unwrap().unwrap().image.get_pixel(0, 0).0)
            .collect();
        assert_eq!(colors, vec![[0, 0, 255], [255, 0, 0], [0, 0, 255]]);
    }

    #[test]
    fn test_multifilesrc_without_loop_ends() {
        let dir = tempfile::tempdir().unwrap();
        TestPattern::Red.render(4, 4, 0).save(dir.path().join("a.png")).unwrap();

        let mut config = MultiFileConfig::new(dir.path());
        config.looping = false;
        let mut source = MultiFileSource::open(config).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(source.next_frame(), Err(SourceError::EndOfStream(_))));
    }

    #[test]
    fn test_multifilesrc_restart_rereads_directory() {
        let dir = tempfile::tempdir().unwrap();
        TestPattern::Red.render(4, 4, 0).save(dir.path().join("a.png")).unwrap();

        let mut source = MultiFileSource::open(MultiFileConfig::new(dir.path())).unwrap();
        source.next_frame().unwrap();
        source.stop().unwrap();

        TestPattern::Blue.render(4, 4, 0).save(dir.path().join("0.png")).unwrap();
        source.restart().unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.image.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(frame.sequence, 1);
    }

    #[test]
    fn test_multifilesrc_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = MultiFileSource::open(MultiFileConfig::new(dir.path()));
        assert!(matches!(result, Err(SourceError::InvalidDescription { .. })));
    }
}
