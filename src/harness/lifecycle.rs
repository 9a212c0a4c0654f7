//! The run lifecycle: acquire the session, execute the script, classify the
//! outcome, capture the screenshot, release the session, then report.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::capabilities::SessionCapabilities;
use super::classify::classify;
use super::report::ExitStatus;
use super::script::Script;
use super::types::{Outcome, RunState};
use crate::capture::{CaptureError, save_frame, screenshot_path};
use crate::session::{ReleaseError, Session, SessionConfig, SessionGuard, SessionInitError};

/// Everything a run needs besides the script
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub session: SessionConfig,
    /// Where `screenshot.png` is written
    pub artifact_dir: PathBuf,
}

impl RunConfig {
    pub fn new(session: SessionConfig) -> Self {
        Self {
            session,
            artifact_dir: PathBuf::from("."),
        }
    }

    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }
}

/// What happened during a run
#[derive(Debug)]
pub struct RunReport {
    pub script: String,
    pub outcome: Outcome,
    pub exit: ExitStatus,
    /// States visited, in order
    pub states: Vec<RunState>,
    /// Screenshot written on a classified timeout
    pub screenshot: Option<PathBuf>,
    /// The screenshot couldn't be written
    pub capture_error: Option<CaptureError>,
    /// The session didn't close cleanly; never changes the exit status
    pub release_error: Option<ReleaseError>,
}

/// Run `script` against a freshly acquired session
pub fn execute(script: &dyn Script, config: &RunConfig) -> RunReport {
    execute_with(script, config, Session::acquire)
}

/// Like [`execute`], with the session supplied by `acquire`
pub fn execute_with<A>(script: &dyn Script, config: &RunConfig, acquire: A) -> RunReport
where
    A: FnOnce(&SessionConfig) -> Result<Session, SessionInitError>,
{
    let name = script.name();
    let mut states = vec![RunState::Init, RunState::Acquiring];

    let session = match acquire(&config.session) {
        Ok(session) => session,
        Err(err) => {
            let outcome = Outcome::SessionInitFailed(err);
            states.push(RunState::Reporting);
            let exit = ExitStatus::from_outcome(&name, &outcome, None);
            states.push(RunState::Terminal);
            return RunReport {
                script: name,
                outcome,
                exit,
                states,
                screenshot: None,
                capture_error: None,
                release_error: None,
            };
        }
    };
    let mut guard = SessionGuard::new(session);

    states.push(RunState::Executing);
    info!("Running {}", name);
    let result = {
        let mut api = SessionCapabilities::new(&mut guard, script.base_dir());
        script.run(&mut api)
    };

    states.push(RunState::Classifying);
    let mut outcome = classify(result);
    debug!("Outcome: {}", outcome.name());

    let mut screenshot = None;
    let mut capture_error = None;
    if let Outcome::ClassifiedTimeout(timeout) = &mut outcome {
        if let Some(frame) = timeout.screenshot.take() {
            states.push(RunState::Capturing);
            let path = screenshot_path(&config.artifact_dir);
            match save_frame(&frame, &path) {
                Ok(()) => screenshot = Some(path),
                Err(err) => {
                    warn!("{}", err);
                    capture_error = Some(err);
                }
            }
        }
    }

    states.push(RunState::Releasing);
    let release_error = guard.release().err();
    if let Some(err) = &release_error {
        warn!("{}", err);
    }
    drop(guard);

    states.push(RunState::Reporting);
    let exit = ExitStatus::from_outcome(&name, &outcome, screenshot.as_deref());
    states.push(RunState::Terminal);

    RunReport {
        script: name,
        outcome,
        exit,
        states,
        screenshot,
        capture_error,
        release_error,
    }
}
