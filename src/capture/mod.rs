pub mod artifact;
pub mod pattern;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod types;

pub use artifact::{SCREENSHOT_FILENAME, save_frame, screenshot_path};
pub use pattern::{PATTERN_COUNT, TestPattern};
pub use sink::{DirectorySink, FrameSink, NullSink, open_sink};
pub use source::{FrameSource, MultiFileConfig, MultiFileSource, PatternHandle, VideoTestSource, open_source};
pub use types::{CaptureError, Frame, SinkError, SourceError};
