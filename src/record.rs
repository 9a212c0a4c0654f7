//! Recording test scripts from a real remote control.
//!
//! Every key press read from the control recorder is forwarded to the device
//! under test. Once the picture has settled, the current frame is saved as
//! `NNNN-KEY-complete.png` and a `press` step plus a `wait_for_match` step
//! are appended to the script.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::{CaptureError, Frame, SourceError, save_frame};
use crate::control::{ControlError, uri_to_remote_recorder};
use crate::harness::capabilities::parent_dir;
use crate::harness::{Step, StepScript};
use crate::session::{Session, SessionConfig, SessionGuard, SessionInitError};

/// Settings for a recording
#[derive(Debug, Clone)]
pub struct RecordConfig {
    pub session: SessionConfig,
    /// Key recorder URI, e.g. `file:///dev/stdin`
    pub control_recorder: String,
    /// Script to write; images are saved next to it
    pub output_file: PathBuf,
    /// Stream time to wait after each press before saving the frame
    pub settle: Duration,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to start the recording session")]
    Session(#[source] SessionInitError),

    #[error("Failed to open the control recorder")]
    Recorder(#[source] ControlError),

    #[error("Failed to read key press: {0}")]
    ReadKey(#[source] io::Error),

    #[error("Failed to press '{key}'")]
    Press {
        key: String,
        #[source]
        source: ControlError,
    },

    #[error("Failed to read video frame: {0}")]
    Source(#[source] SourceError),

    #[error("No video frame received after pressing '{0}'")]
    NoFrame(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Failed to serialize script: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Failed to write script '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Record a script using the configured session and key recorder
pub fn record(config: &RecordConfig) -> Result<StepScript, RecordError> {
    let session = Session::acquire(&config.session).map_err(RecordError::Session)?;
    let guard = SessionGuard::new(session);
    let keys = uri_to_remote_recorder(&config.control_recorder).map_err(RecordError::Recorder)?;
    record_with(guard, keys, &config.output_file, config.settle)
}

/// Record a script from `keys` using an already acquired session.
///
/// The session is released before returning, whatever the result.
pub fn record_with<I>(
    mut guard: SessionGuard,
    keys: I,
    output_file: &Path,
    settle: Duration,
) -> Result<StepScript, RecordError>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let result = record_steps(&mut guard, keys, output_file, settle);
    if let Err(e) = guard.release() {
        warn!("{}", e);
    }
    let script = StepScript::new(output_file, result?);

    let yaml = script.to_yaml().map_err(RecordError::Serialize)?;
    fs::write(output_file, yaml).map_err(|source| RecordError::Write {
        path: output_file.to_path_buf(),
        source,
    })?;
    info!(
        "Wrote {} steps to {}",
        script.steps.len(),
        output_file.display()
    );
    Ok(script)
}

fn record_steps<I>(
    session: &mut Session,
    keys: I,
    output_file: &Path,
    settle: Duration,
) -> Result<Vec<Step>, RecordError>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let dir = parent_dir(output_file);
    let mut steps = Vec::new();

    for (i, key) in keys.into_iter().enumerate() {
        let key = key.map_err(RecordError::ReadKey)?;
        session.press(&key).map_err(|source| RecordError::Press {
            key: key.clone(),
            source,
        })?;
        debug!("Recorded key press {}", key);

        let frame = settled_frame(session, settle)?.ok_or_else(|| RecordError::NoFrame(key.clone()))?;
        let image = format!("{:04}-{}-complete.png", i + 1, sanitize_key(&key));
        save_frame(&frame, &dir.join(&image))?;

        steps.push(Step::Press { key });
        steps.push(Step::WaitForMatch {
            image,
            timeout_secs: None,
            consecutive_matches: None,
            noise_threshold: None,
        });
    }
    Ok(steps)
}

/// Pull frames for `settle` of stream time (or wall-clock time if the
/// stream stalls) and return the last one
fn settled_frame(session: &mut Session, settle: Duration) -> Result<Option<Frame>, RecordError> {
    let started = Instant::now();
    let mut first_timestamp = None;
    loop {
        if let Some(frame) = session.next_frame().map_err(RecordError::Source)? {
            let first = *first_timestamp.get_or_insert(frame.timestamp);
            if frame.timestamp.saturating_sub(first) >= settle {
                return Ok(Some(frame));
            }
        }
        if started.elapsed() >= settle {
            return Ok(session.last_frame().cloned());
        }
    }
}

/// Make a key name safe for use in a file name
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameSink, FrameSource, NullSink, SinkError, TestPattern, VideoTestSource};
    use crate::control::{RemoteControl, TestControl};
    use image::RgbImage;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::harness::{Outcome, RunConfig, execute};
    use pretty_assertions::assert_eq;

    fn guard() -> SessionGuard {
        let source = VideoTestSource::new(64, 48, TestPattern::Smpte).framerate(5);
        let control = TestControl::new(source.pattern_handle()).unwrap();
        SessionGuard::new(Session::from_parts(
            Box::new(source),
            Box::new(NullSink::default()),
            Box::new(control),
        ))
    }

    fn keys(keys: &[&str]) -> Vec<io::Result<String>> {
        keys.iter().map(|k| Ok(k.to_string())).collect()
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("KEY_OK"), "KEY_OK");
        assert_eq!(sanitize_key("a/b c"), "a_b_c");
    }

    #[test]
    fn test_record_writes_images_and_script() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("recorded.yaml");

        let script = record_with(guard(), keys(&["2", "0"]), &output, Duration::from_millis(400)).unwrap();
        assert_eq!(script.steps.len(), 4);
        assert_eq!(
            script.steps[0],
            Step::Press {
                key: "2".to_string()
            }
        );
        assert!(dir.path().join("0001-2-complete.png").exists());
        assert!(dir.path().join("0002-0-complete.png").exists());

        let black = image::open(dir.path().join("0001-2-complete.png"))
            .unwrap()
            .to_rgb8();
        assert!(black.pixels().all(|p| p.0 == [0, 0, 0]));

        let loaded = StepScript::load(&output).unwrap();
        assert_eq!(loaded.steps, script.steps);
    }

    #[test]
    fn test_recorded_script_replays() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("recorded.yaml");
        record_with(guard(), keys(&["2", "0"]), &output, Duration::from_millis(200)).unwrap();

        let script = StepScript::load(&output).unwrap();
        let config = RunConfig::new(SessionConfig::new(
            "videotestsrc width=64 height=48 framerate=5",
            "fakesink",
            "test",
        ))
        .artifact_dir(dir.path());
        let report = execute(&script, &config);
        assert!(matches!(report.outcome, Outcome::Success), "{:?}", report.outcome);
    }

    /// Grey frames; counts stop, finish and close calls
    struct Counted {
        sequence: u64,
        releases: Arc<[AtomicUsize; 3]>,
    }

    impl FrameSource for Counted {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            let frame = Frame::new(
                RgbImage::from_pixel(32, 24, image::Rgb([128, 128, 128])),
                Duration::from_millis(40 * self.sequence),
                self.sequence,
            );
            self.sequence += 1;
            Ok(Some(frame))
        }

        fn source_type(&self) -> &str {
            "counted"
        }

        fn stop(&mut self) -> Result<(), SourceError> {
            self.releases[0].fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl FrameSink for Counted {
        fn push(&mut self, _frame: &Frame) -> Result<(), SinkError> {
            Ok(())
        }

        fn sink_type(&self) -> &str {
            "counted"
        }

        fn finish(&mut self) -> Result<(), SinkError> {
            self.releases[1].fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl RemoteControl for Counted {
        fn press(&mut self, _key: &str) -> Result<(), ControlError> {
            Ok(())
        }

        fn control_type(&self) -> &str {
            "counted"
        }

        fn close(&mut self) -> Result<(), ControlError> {
            self.releases[2].fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_key_read_error_releases_session() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("recorded.yaml");
        let releases: Arc<[AtomicUsize; 3]> = Arc::default();
        let counted = || Counted {
            sequence: 0,
            releases: releases.clone(),
        };
        let guard = SessionGuard::new(Session::from_parts(
            Box::new(counted()),
            Box::new(counted()),
            Box::new(counted()),
        ));
        let keys = vec![
            Ok("1".to_string()),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "recorder went away")),
        ];

        let err = record_with(guard, keys, &output, Duration::ZERO).unwrap_err();
        assert!(matches!(err, RecordError::ReadKey(_)));
        assert!(!output.exists());
        assert!(dir.path().join("0001-1-complete.png").exists());
        let counts: Vec<usize> = releases.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_invalid_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = record_with(guard(), keys(&["MENU"]), &dir.path().join("r.yaml"), Duration::ZERO).unwrap_err();
        assert!(matches!(err, RecordError::Press { .. }));
    }
}
