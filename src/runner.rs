//! Machine-readable summaries of test runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::harness::{Outcome, RunReport, RunState, TimeoutKind};

/// Details of a classified timeout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSummary {
    /// "match" or "motion"
    pub kind: String,

    /// What the script was waiting for
    pub expected: String,

    /// The deadline that elapsed
    pub timeout_secs: u64,
}

/// Result of a complete test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Script that was run
    pub script: String,

    /// `success`, `classified_timeout`, `unclassified_failure` or `session_init_failed`
    pub outcome: String,

    /// Process exit status
    pub exit_code: u8,

    /// Failure message, if the run failed
    pub message: Option<String>,

    /// Timeout details, for classified timeouts
    pub timeout: Option<TimeoutSummary>,

    /// Screenshot written on timeout
    pub screenshot_path: Option<PathBuf>,

    /// Warning raised while writing the screenshot
    pub capture_warning: Option<String>,

    /// Warning raised while releasing the session
    pub release_warning: Option<String>,

    /// Lifecycle states visited, in order
    pub states: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn from_report(
        report: &RunReport,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let timeout = match &report.outcome {
            Outcome::ClassifiedTimeout(t) => Some(TimeoutSummary {
                kind: match t.kind {
                    TimeoutKind::Match => "match",
                    TimeoutKind::Motion => "motion",
                }
                .to_string(),
                expected: t.expected.clone(),
                timeout_secs: t.timeout_secs,
            }),
            _ => None,
        };

        Self {
            script: report.script.clone(),
            outcome: report.outcome.name().to_string(),
            exit_code: report.exit.code,
            message: report.exit.message.clone(),
            timeout,
            screenshot_path: report.screenshot.clone(),
            capture_warning: report.capture_error.as_ref().map(|e| e.to_string()),
            release_warning: report.release_error.as_ref().map(|e| e.to_string()),
            states: report.states.iter().map(|s| state_name(*s)).collect(),
            started_at,
            finished_at,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn state_name(state: RunState) -> String {
    serde_json::to_value(state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", state))
}
