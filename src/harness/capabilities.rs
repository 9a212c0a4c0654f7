//! The interaction API handed to scripts.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{CapabilityError, TimeoutFailure, TimeoutKind};
use crate::capture::Frame;
use crate::session::Session;
use crate::vision::matching::resolve_image_path;
use crate::vision::{Mask, MatchPosition, MotionDetector, Template, find_match, to_gray};

/// Default deadline of `wait_for_match` and `wait_for_motion`
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default fraction of the pixel range tolerated as noise when matching
pub const DEFAULT_NOISE_THRESHOLD: f64 = 0.16;

/// Options for `wait_for_match`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOptions {
    pub timeout_secs: u64,
    /// Number of consecutive frames that must match at the same position
    pub consecutive_matches: u32,
    pub noise_threshold: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            consecutive_matches: 1,
            noise_threshold: DEFAULT_NOISE_THRESHOLD,
        }
    }
}

impl MatchOptions {
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn consecutive_matches(mut self, n: u32) -> Self {
        self.consecutive_matches = n;
        self
    }

    pub fn noise_threshold(mut self, threshold: f64) -> Self {
        self.noise_threshold = threshold;
        self
    }
}

/// Options for `press_until_match`
#[derive(Debug, Clone, PartialEq)]
pub struct PressUntilMatchOptions {
    /// How long to look for the match after each press
    pub interval_secs: u64,
    pub noise_threshold: f64,
    pub max_presses: u32,
}

impl Default for PressUntilMatchOptions {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            noise_threshold: DEFAULT_NOISE_THRESHOLD,
            max_presses: 10,
        }
    }
}

impl PressUntilMatchOptions {
    pub fn interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn noise_threshold(mut self, threshold: f64) -> Self {
        self.noise_threshold = threshold;
        self
    }

    pub fn max_presses(mut self, n: u32) -> Self {
        self.max_presses = n;
        self
    }
}

/// Options for `wait_for_motion`
#[derive(Debug, Clone, PartialEq)]
pub struct MotionOptions {
    pub timeout_secs: u64,
    /// Number of consecutive frames that must show motion
    pub consecutive_frames: u32,
    /// Image selecting the region to observe (white = observed)
    pub mask: Option<String>,
}

impl Default for MotionOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            consecutive_frames: 10,
            mask: None,
        }
    }
}

impl MotionOptions {
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn consecutive_frames(mut self, n: u32) -> Self {
        self.consecutive_frames = n;
        self
    }

    pub fn mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }
}

/// A successful match
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFound {
    pub position: MatchPosition,
    pub first_pass_certainty: f64,
    /// Stream time of the frame that completed the match
    pub timestamp: Duration,
}

/// Operations a script may perform on the device under test.
///
/// Each call may block until its deadline. Timeouts are reported as
/// `CapabilityError::Timeout`.
pub trait Capabilities {
    /// Send a single key press
    fn press(&mut self, key: &str) -> Result<(), CapabilityError>;

    /// Wait until `image` is found on screen
    fn wait_for_match(
        &mut self,
        image: &str,
        options: &MatchOptions,
    ) -> Result<MatchFound, CapabilityError>;

    /// Wait until the screen changes
    fn wait_for_motion(&mut self, options: &MotionOptions) -> Result<(), CapabilityError>;

    /// Press `key` until `image` appears.
    ///
    /// Looks for the image for `interval_secs`; if it doesn't appear, presses
    /// the key and looks again. After `max_presses` presses the last timeout
    /// is returned.
    fn press_until_match(
        &mut self,
        key: &str,
        image: &str,
        options: &PressUntilMatchOptions,
    ) -> Result<MatchFound, CapabilityError> {
        let match_options = MatchOptions::default()
            .timeout_secs(options.interval_secs)
            .noise_threshold(options.noise_threshold);
        let mut presses = 0;
        loop {
            match self.wait_for_match(image, &match_options) {
                Err(CapabilityError::Timeout(timeout)) if presses < options.max_presses => {
                    debug!("press_until_match: {}; pressing {}", timeout, key);
                    self.press(key)?;
                    presses += 1;
                }
                result => return result,
            }
        }
    }
}

/// Capabilities backed by a live session
#[derive(Debug)]
pub struct SessionCapabilities<'s> {
    session: &'s mut Session,
    script_dir: PathBuf,
}

impl<'s> SessionCapabilities<'s> {
    /// `script_dir` is where relative template and mask paths are looked up
    /// first
    pub fn new(session: &'s mut Session, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            script_dir: script_dir.into(),
        }
    }

    fn resolve(&self, image: &str) -> PathBuf {
        resolve_image_path(image, &self.script_dir)
    }

    fn timeout(&self, kind: TimeoutKind, expected: &str, timeout_secs: u64) -> CapabilityError {
        CapabilityError::Timeout(TimeoutFailure {
            kind,
            expected: expected.to_string(),
            timeout_secs,
            screenshot: self.session.last_frame().cloned(),
        })
    }
}

/// Tracks the deadline of a capability call in both stream time and wall-clock
/// time; whichever elapses first ends the wait.
///
/// Wall-clock time spent restarting the source doesn't count.
struct Deadline {
    timeout: Duration,
    started: Instant,
    recovery_at_start: Duration,
    first_timestamp: Option<Duration>,
}

impl Deadline {
    fn new(timeout_secs: u64, session: &Session) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            started: Instant::now(),
            recovery_at_start: session.recovery_time(),
            first_timestamp: None,
        }
    }

    fn expired(&mut self, frame: Option<&Frame>, recovery_time: Duration) -> bool {
        if let Some(frame) = frame {
            let first = *self.first_timestamp.get_or_insert(frame.timestamp);
            if frame.timestamp.saturating_sub(first) >= self.timeout {
                return true;
            }
        }
        let paused = recovery_time.saturating_sub(self.recovery_at_start);
        self.started.elapsed().saturating_sub(paused) >= self.timeout
    }
}

impl Capabilities for SessionCapabilities<'_> {
    fn press(&mut self, key: &str) -> Result<(), CapabilityError> {
        self.session.press(key)?;
        info!("Pressed {}", key);
        Ok(())
    }

    fn wait_for_match(
        &mut self,
        image: &str,
        options: &MatchOptions,
    ) -> Result<MatchFound, CapabilityError> {
        let template = Template::load(image, &self.resolve(image))?;
        let required = options.consecutive_matches.max(1);
        let mut deadline = Deadline::new(options.timeout_secs, self.session);
        let mut streak: Option<(MatchPosition, u32)> = None;

        debug!("Searching for {}", image);
        loop {
            let frame = self.session.next_frame()?;
            if let Some(frame) = &frame {
                let result = find_match(&to_gray(&frame.image), &template, options.noise_threshold)?;
                if result.matched {
                    let count = match streak {
                        Some((position, n)) if position == result.position => n + 1,
                        _ => 1,
                    };
                    streak = Some((result.position, count));
                    if count >= required {
                        info!(
                            "Found {} at ({}, {}) (certainty {:.3})",
                            image, result.position.x, result.position.y, result.first_pass_certainty
                        );
                        return Ok(MatchFound {
                            position: result.position,
                            first_pass_certainty: result.first_pass_certainty,
                            timestamp: frame.timestamp,
                        });
                    }
                } else {
                    streak = None;
                }
            }
            if deadline.expired(frame.as_ref(), self.session.recovery_time()) {
                return Err(self.timeout(TimeoutKind::Match, image, options.timeout_secs));
            }
        }
    }

    fn wait_for_motion(&mut self, options: &MotionOptions) -> Result<(), CapabilityError> {
        let mask = match &options.mask {
            Some(mask) => Some(Mask::load(mask.as_str(), &self.resolve(mask))?),
            None => None,
        };
        let expected = options.mask.as_deref().unwrap_or("<whole frame>");
        let required = options.consecutive_frames.max(1);
        let mut detector = MotionDetector::new(mask);
        let mut deadline = Deadline::new(options.timeout_secs, self.session);
        let mut streak = 0;

        debug!("Waiting for {} frames with motion", required);
        loop {
            let frame = self.session.next_frame()?;
            if let Some(frame) = &frame {
                if detector.detect(&frame.image)? {
                    streak += 1;
                    if streak >= required {
                        info!("Motion detected at {:?}", frame.timestamp);
                        return Ok(());
                    }
                } else {
                    streak = 0;
                }
            }
            if deadline.expired(frame.as_ref(), self.session.recovery_time()) {
                return Err(self.timeout(TimeoutKind::Motion, expected, options.timeout_secs));
            }
        }
    }
}

/// Directory holding `path`, or the working directory for bare file names
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
