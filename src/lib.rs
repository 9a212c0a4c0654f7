//! stb-harness - Automated testing of set-top boxes.
//!
//! This crate provides:
//! - Video sources and sinks (`videotestsrc`, `multifilesrc`, `fakesink`, `filesink`)
//! - Remote controls (`none`, `test`, VirtualRemote, LIRC) and key recorders
//! - Template matching and motion detection on captured frames
//! - A run lifecycle that always releases the session and maps the outcome
//!   to an exit status
//!
//! # Example
//!
//! ```rust,no_run
//! use stb_harness::harness::{RunConfig, StepScript, execute};
//! use stb_harness::session::SessionConfig;
//! use std::path::Path;
//!
//! let script = StepScript::load(Path::new("menu.yaml")).unwrap();
//! let config = RunConfig::new(SessionConfig::new("videotestsrc", "fakesink", "test"));
//! let report = execute(&script, &config);
//! std::process::exit(report.exit.code.into());
//! ```

pub mod capture;
pub mod config;
pub mod control;
pub mod harness;
pub mod logging;
pub mod record;
pub mod runner;
pub mod session;
pub mod vision;

// Re-export the run lifecycle
pub use harness::{
    Capabilities, ExitStatus, MatchOptions, MotionOptions, Outcome, PressUntilMatchOptions,
    RunConfig, RunReport, Script, ScriptError, StepScript, execute,
};

// Re-export session management
pub use session::{Session, SessionConfig, SessionGuard};

// Re-export summaries
pub use runner::RunSummary;
