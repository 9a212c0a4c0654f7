pub mod capabilities;
pub mod classify;
pub mod lifecycle;
pub mod report;
pub mod script;
pub mod types;

pub use capabilities::{
    Capabilities, MatchFound, MatchOptions, MotionOptions, PressUntilMatchOptions,
    SessionCapabilities,
};
pub use classify::classify;
pub use lifecycle::{RunConfig, RunReport, execute, execute_with};
pub use report::{EXIT_FAILURE, EXIT_SESSION_INIT, EXIT_SUCCESS, EXIT_TIMEOUT, ExitStatus};
pub use script::{Script, Step, StepScript};
pub use types::{
    CapabilityError, FailureKind, Outcome, RunState, ScriptCause, ScriptError, ScriptLoadError,
    ScriptLocation, TimeoutFailure, TimeoutKind,
};
