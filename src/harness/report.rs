//! Exit status mapping and failure messages.

use std::error::Error;
use std::path::Path;

use super::types::{Outcome, ScriptLoadError};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_TIMEOUT: u8 = 1;
pub const EXIT_FAILURE: u8 = 2;
pub const EXIT_SESSION_INIT: u8 = 3;

/// Process exit status of a run, with the message to print (if any)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: u8,
    pub message: Option<String>,
}

impl ExitStatus {
    /// Map a run outcome to its exit status.
    ///
    /// `screenshot` is where the timeout screenshot was saved, if it was.
    pub fn from_outcome(script: &str, outcome: &Outcome, screenshot: Option<&Path>) -> Self {
        match outcome {
            Outcome::Success => Self {
                code: EXIT_SUCCESS,
                message: None,
            },
            Outcome::ClassifiedTimeout(timeout) => {
                let mut message = format!("FAIL: {}: {}", script, timeout);
                if let Some(path) = screenshot {
                    message.push_str(&format!("\nScreenshot saved to '{}'", path.display()));
                }
                Self {
                    code: EXIT_TIMEOUT,
                    message: Some(message),
                }
            }
            Outcome::UnclassifiedFailure(err) => Self {
                code: EXIT_FAILURE,
                message: Some(format!("FAIL: {}: {}", script, error_chain(err))),
            },
            Outcome::SessionInitFailed(err) => Self {
                code: EXIT_SESSION_INIT,
                message: Some(format!("ERROR: {}: {}", script, error_chain(err))),
            },
        }
    }

    /// The script couldn't be loaded, so no session was started
    pub fn from_load_error(script: &str, err: &ScriptLoadError) -> Self {
        Self {
            code: EXIT_FAILURE,
            message: Some(format!("FAIL: {}: {}", script, error_chain(err))),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == EXIT_SUCCESS
    }
}

/// Format an error followed by each cause not already part of its message
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(&format!("\n  caused by: {}", text));
        }
        source = cause.source();
    }
    message
}
