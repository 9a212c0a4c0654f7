//! Session management for the device under test.
//!
//! A session bundles the three resources a run interacts with:
//! - the capture source producing video frames
//! - the output sink receiving every frame that was pulled
//! - the control channel sending key presses
//!
//! Sessions are released exactly once. `SessionGuard` releases on drop, so
//! a panicking script still leaves no resource open.
//!
//! When the source stops delivering frames for a while (e.g. an HDMI capture
//! device losing signal), the session restarts it. See [`RecoveryPolicy`].

use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::capture::{Frame, FrameSink, FrameSource, SinkError, SourceError, open_sink, open_source};
use crate::control::{ControlError, RemoteControl, uri_to_remote};

/// Descriptions of the resources making up a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Source description, e.g. `videotestsrc pattern=0 is-live=true`
    pub source_pipeline: String,
    /// Sink description, e.g. `fakesink`
    pub sink_pipeline: String,
    /// Control URI, e.g. `vr:192.168.0.10`
    pub control: String,
}

impl SessionConfig {
    pub fn new(
        source_pipeline: impl Into<String>,
        sink_pipeline: impl Into<String>,
        control: impl Into<String>,
    ) -> Self {
        Self {
            source_pipeline: source_pipeline.into(),
            sink_pipeline: sink_pipeline.into(),
            control: control.into(),
        }
    }
}

/// A session could not be established
#[derive(Debug, Error)]
pub enum SessionInitError {
    #[error("Failed to start the source pipeline")]
    Source(#[source] SourceError),

    #[error("Failed to start the sink pipeline")]
    Sink(#[source] SinkError),

    #[error("Failed to connect the remote control")]
    Control(#[source] ControlError),
}

/// Time without frames before the source is restarted
pub const VIDEO_LOSS_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between stopping the source and starting it again
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Restarts attempted in a row before waiting it out
pub const MAX_SUCCESSIVE_RESTARTS: u32 = 3;

/// How a session recovers from loss of video.
///
/// The restart counter is reset as soon as a frame arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub video_loss_timeout: Duration,
    pub restart_delay: Duration,
    pub max_restarts: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            video_loss_timeout: VIDEO_LOSS_TIMEOUT,
            restart_delay: RESTART_DELAY,
            max_restarts: MAX_SUCCESSIVE_RESTARTS,
        }
    }
}

/// One or more session resources failed to close.
///
/// All resources are still released; this only reports what went wrong.
#[derive(Debug, Error)]
#[error("Failed to release session: {}", failures.join("; "))]
pub struct ReleaseError {
    pub failures: Vec<String>,
}

/// An acquired capture/control session
pub struct Session {
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    control: Box<dyn RemoteControl>,
    last_frame: Option<Frame>,
    sink_failed: bool,
    released: bool,
    recovery: RecoveryPolicy,
    no_signal_since: Option<Instant>,
    successive_restarts: u32,
    recovery_time: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("source", &self.source.source_type())
            .field("sink", &self.sink.sink_type())
            .field("control", &self.control.control_type())
            .field("last_frame", &self.last_frame)
            .field("released", &self.released)
            .finish()
    }
}

impl Session {
    /// Open the source, sink and control, in that order.
    ///
    /// If a later resource fails, the ones already opened are closed before
    /// the error is returned.
    pub fn acquire(config: &SessionConfig) -> Result<Self, SessionInitError> {
        debug!("Acquiring session: {:?}", config);
        let mut source = open_source(&config.source_pipeline).map_err(SessionInitError::Source)?;

        let mut sink = match open_sink(&config.sink_pipeline) {
            Ok(sink) => sink,
            Err(e) => {
                stop_quietly(source.as_mut());
                return Err(SessionInitError::Sink(e));
            }
        };

        let control = match uri_to_remote(&config.control, source.pattern_handle()) {
            Ok(control) => control,
            Err(e) => {
                if let Err(finish_err) = sink.finish() {
                    warn!("Failed to close sink after init failure: {}", finish_err);
                }
                stop_quietly(source.as_mut());
                return Err(SessionInitError::Control(e));
            }
        };

        info!(
            "Session acquired (source={}, sink={}, control={})",
            source.source_type(),
            sink.sink_type(),
            control.control_type()
        );
        Ok(Self::from_parts(source, sink, control))
    }

    /// Assemble a session from already-opened resources
    pub fn from_parts(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        control: Box<dyn RemoteControl>,
    ) -> Self {
        Self {
            source,
            sink,
            control,
            last_frame: None,
            sink_failed: false,
            released: false,
            recovery: RecoveryPolicy::default(),
            no_signal_since: None,
            successive_restarts: 0,
            recovery_time: Duration::ZERO,
        }
    }

    pub fn recovery(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery = policy;
        self
    }

    /// Pull the next frame from the source and forward it to the sink.
    ///
    /// `Ok(None)` means no frame was available (no signal). If that lasts
    /// for the policy's `video_loss_timeout`, the source is restarted
    /// before returning.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(frame) = self.source.next_frame()? else {
            self.on_no_signal()?;
            return Ok(None);
        };
        if self.successive_restarts > 0 {
            info!("Video recovered after {} restart(s)", self.successive_restarts);
        }
        self.no_signal_since = None;
        self.successive_restarts = 0;
        if let Err(e) = self.sink.push(&frame) {
            if !self.sink_failed {
                warn!("Sink '{}' failed: {}", self.sink.sink_type(), e);
                self.sink_failed = true;
            } else {
                debug!("Sink '{}' failed: {}", self.sink.sink_type(), e);
            }
        }
        self.last_frame = Some(frame.clone());
        Ok(Some(frame))
    }

    fn on_no_signal(&mut self) -> Result<(), SourceError> {
        let since = *self.no_signal_since.get_or_insert_with(Instant::now);
        if since.elapsed() < self.recovery.video_loss_timeout {
            return Ok(());
        }
        if self.successive_restarts >= self.recovery.max_restarts {
            trace!("No video; already restarted {} times", self.successive_restarts);
            return Ok(());
        }

        self.successive_restarts += 1;
        let started = Instant::now();
        warn!(
            "No video for {:.1}s; restarting {} source ({} of {})",
            since.elapsed().as_secs_f64(),
            self.source.source_type(),
            self.successive_restarts,
            self.recovery.max_restarts
        );
        self.source.stop()?;
        std::thread::sleep(self.recovery.restart_delay);
        self.source.restart()?;
        debug!("Restarted {} source", self.source.source_type());

        self.recovery_time += started.elapsed();
        self.no_signal_since = Some(Instant::now());
        Ok(())
    }

    /// Total wall-clock time spent restarting the source
    pub fn recovery_time(&self) -> Duration {
        self.recovery_time
    }

    /// The most recent frame pulled from the source, if any
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Send a key press through the control channel
    pub fn press(&mut self, key: &str) -> Result<(), ControlError> {
        self.control.press(key)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Close the control, finish the sink and stop the source.
    ///
    /// Every resource is closed even if an earlier one fails. Calling this
    /// again after it has run (successfully or not) does nothing.
    pub fn release(&mut self) -> Result<(), ReleaseError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        debug!("Releasing session");

        let mut failures = Vec::new();
        if let Err(e) = self.control.close() {
            failures.push(format!("control: {}", e));
        }
        if let Err(e) = self.sink.finish() {
            failures.push(format!("sink: {}", e));
        }
        if let Err(e) = self.source.stop() {
            failures.push(format!("source: {}", e));
        }

        if failures.is_empty() {
            info!("Session released");
            Ok(())
        } else {
            Err(ReleaseError { failures })
        }
    }
}

fn stop_quietly(source: &mut dyn FrameSource) {
    if let Err(e) = source.stop() {
        warn!("Failed to stop source after init failure: {}", e);
    }
}

/// Releases the session when dropped, including while unwinding from a panic
#[derive(Debug)]
pub struct SessionGuard {
    session: Session,
}

impl SessionGuard {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Release explicitly, observing any error
    pub fn release(&mut self) -> Result<(), ReleaseError> {
        self.session.release()
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.session.is_released() {
            return;
        }
        if let Err(e) = self.session.release() {
            warn!("{}", e);
        }
    }
}
