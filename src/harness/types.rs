use serde::Serialize;
use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

use crate::capture::{Frame, SourceError};
use crate::control::ControlError;
use crate::session::SessionInitError;
use crate::vision::MatchError;

/// What a timed-out capability was waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    Match,
    Motion,
}

/// The expected thing didn't appear on screen before the deadline
#[derive(Debug, Clone)]
pub struct TimeoutFailure {
    pub kind: TimeoutKind,
    /// Description of what was sought (template or mask name)
    pub expected: String,
    /// The deadline that elapsed
    pub timeout_secs: u64,
    /// Frame captured when the deadline elapsed, if any frame was ever received
    pub screenshot: Option<Frame>,
}

impl fmt::Display for TimeoutFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TimeoutKind::Match => write!(
                f,
                "Didn't find match for '{}' after {} seconds.",
                self.expected, self.timeout_secs
            ),
            TimeoutKind::Motion => write!(
                f,
                "Didn't find motion for '{}' within {} seconds.",
                self.expected, self.timeout_secs
            ),
        }
    }
}

impl std::error::Error for TimeoutFailure {}

/// Classification of a script failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Other,
}

/// Failure of a single capability call
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error(transparent)]
    Timeout(#[from] TimeoutFailure),

    #[error(transparent)]
    Vision(#[from] MatchError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Invalid sleep of {secs} seconds: {source}")]
    InvalidSleep {
        secs: f64,
        #[source]
        source: std::time::TryFromFloatSecsError,
    },
}

impl CapabilityError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CapabilityError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Other,
        }
    }
}

/// Where in the script a failure originated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLocation {
    /// A step of a step script; `step` is the 1-based path, e.g. `3` or `2.1`
    Step {
        script: PathBuf,
        step: String,
        action: &'static str,
    },
    /// Source location of an in-process script
    Source { file: &'static str, line: u32 },
}

impl fmt::Display for ScriptLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptLocation::Step {
                script,
                step,
                action,
            } => write!(f, "{}: step {} ({})", script.display(), step, action),
            ScriptLocation::Source { file, line } => write!(f, "{}:{}", file, line),
        }
    }
}

impl From<&'static Location<'static>> for ScriptLocation {
    fn from(location: &'static Location<'static>) -> Self {
        ScriptLocation::Source {
            file: location.file(),
            line: location.line(),
        }
    }
}

/// What made a script fail
#[derive(Debug)]
pub enum ScriptCause {
    Capability(CapabilityError),
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// A script stopped with an error
#[derive(Debug)]
pub struct ScriptError {
    pub cause: ScriptCause,
    pub location: Option<ScriptLocation>,
}

impl ScriptError {
    /// Wrap any error raised by script code, recording the caller's location
    #[track_caller]
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            cause: ScriptCause::Other(err.into()),
            location: Some(Location::caller().into()),
        }
    }

    /// Fail with a message, recording the caller's location
    #[track_caller]
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            cause: ScriptCause::Other(message.into()),
            location: Some(Location::caller().into()),
        }
    }

    pub fn at(mut self, location: ScriptLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn kind(&self) -> FailureKind {
        match &self.cause {
            ScriptCause::Capability(err) => err.kind(),
            ScriptCause::Other(_) => FailureKind::Other,
        }
    }

    /// Extract the timeout, or give the error back if it is something else
    pub fn into_timeout(self) -> Result<TimeoutFailure, ScriptError> {
        match self.cause {
            ScriptCause::Capability(CapabilityError::Timeout(timeout)) => Ok(timeout),
            cause => Err(ScriptError {
                cause,
                location: self.location,
            }),
        }
    }
}

impl From<CapabilityError> for ScriptError {
    #[track_caller]
    fn from(err: CapabilityError) -> Self {
        Self {
            cause: ScriptCause::Capability(err),
            location: Some(Location::caller().into()),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            ScriptCause::Capability(err) => write!(f, "{}", err)?,
            ScriptCause::Other(err) => write!(f, "{}", err)?,
        }
        if let Some(location) = &self.location {
            write!(f, " (at {})", location)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            ScriptCause::Capability(err) => err.source(),
            ScriptCause::Other(err) => err.source(),
        }
    }
}

/// A script file couldn't be loaded
#[derive(Debug, Error)]
pub enum ScriptLoadError {
    #[error("Failed to read script '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse script '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid step {step} in script '{}': {reason}", path.display())]
    InvalidStep {
        path: PathBuf,
        step: String,
        reason: String,
    },
}

/// The single result of a run
#[derive(Debug)]
pub enum Outcome {
    Success,
    ClassifiedTimeout(TimeoutFailure),
    UnclassifiedFailure(ScriptError),
    SessionInitFailed(SessionInitError),
}

impl Outcome {
    /// Stable identifier used in machine-readable output
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ClassifiedTimeout(_) => "classified_timeout",
            Outcome::UnclassifiedFailure(_) => "unclassified_failure",
            Outcome::SessionInitFailed(_) => "session_init_failed",
        }
    }
}

/// Lifecycle states of a run, in the order they are visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Acquiring,
    Executing,
    Classifying,
    Capturing,
    Releasing,
    Reporting,
    Terminal,
}
