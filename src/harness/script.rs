//! Test scripts.
//!
//! A script is anything implementing [`Script`]: an in-process closure, or a
//! [`StepScript`] loaded from a YAML file such as:
//!
//! ```yaml
//! steps:
//!   - action: press
//!     key: MENU
//!   - action: wait_for_match
//!     image: menu.png
//!     timeout_secs: 5
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::capabilities::{
    Capabilities, MatchOptions, MotionOptions, PressUntilMatchOptions, parent_dir,
};
use super::types::{CapabilityError, ScriptError, ScriptLoadError, ScriptLocation};

/// A unit of test logic run against the device under test
pub trait Script {
    /// Name used in failure reports
    fn name(&self) -> String {
        "<in-process script>".to_string()
    }

    /// Directory where relative image paths are looked up first
    fn base_dir(&self) -> PathBuf {
        PathBuf::from(".")
    }

    /// Run to completion using only the given capabilities
    fn run(&self, api: &mut dyn Capabilities) -> Result<(), ScriptError>;
}

impl<F> Script for F
where
    F: Fn(&mut dyn Capabilities) -> Result<(), ScriptError>,
{
    fn run(&self, api: &mut dyn Capabilities) -> Result<(), ScriptError> {
        self(api)
    }
}

/// A single action of a step script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Send a key press
    Press { key: String },
    /// Wait for an image to appear
    WaitForMatch {
        image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        consecutive_matches: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        noise_threshold: Option<f64>,
    },
    /// Press a key until an image appears
    PressUntilMatch {
        key: String,
        image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        interval_secs: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        noise_threshold: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_presses: Option<u32>,
    },
    /// Wait for the picture to change
    WaitForMotion {
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        consecutive_frames: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mask: Option<String>,
    },
    /// Pause without looking at the screen
    Sleep { secs: f64 },
    /// Run the nested steps several times
    Repeat { times: u32, steps: Vec<Step> },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Press { .. } => "press",
            Step::WaitForMatch { .. } => "wait_for_match",
            Step::PressUntilMatch { .. } => "press_until_match",
            Step::WaitForMotion { .. } => "wait_for_motion",
            Step::Sleep { .. } => "sleep",
            Step::Repeat { .. } => "repeat",
        }
    }

    fn perform(&self, api: &mut dyn Capabilities) -> Result<(), CapabilityError> {
        match self {
            Step::Press { key } => api.press(key),
            Step::WaitForMatch {
                image,
                timeout_secs,
                consecutive_matches,
                noise_threshold,
            } => {
                let defaults = MatchOptions::default();
                let options = MatchOptions {
                    timeout_secs: timeout_secs.unwrap_or(defaults.timeout_secs),
                    consecutive_matches: consecutive_matches.unwrap_or(defaults.consecutive_matches),
                    noise_threshold: noise_threshold.unwrap_or(defaults.noise_threshold),
                };
                api.wait_for_match(image, &options).map(|_| ())
            }
            Step::PressUntilMatch {
                key,
                image,
                interval_secs,
                noise_threshold,
                max_presses,
            } => {
                let defaults = PressUntilMatchOptions::default();
                let options = PressUntilMatchOptions {
                    interval_secs: interval_secs.unwrap_or(defaults.interval_secs),
                    noise_threshold: noise_threshold.unwrap_or(defaults.noise_threshold),
                    max_presses: max_presses.unwrap_or(defaults.max_presses),
                };
                api.press_until_match(key, image, &options).map(|_| ())
            }
            Step::WaitForMotion {
                timeout_secs,
                consecutive_frames,
                mask,
            } => {
                let defaults = MotionOptions::default();
                let options = MotionOptions {
                    timeout_secs: timeout_secs.unwrap_or(defaults.timeout_secs),
                    consecutive_frames: consecutive_frames.unwrap_or(defaults.consecutive_frames),
                    mask: mask.clone(),
                };
                api.wait_for_motion(&options)
            }
            Step::Sleep { secs } => {
                let duration = Duration::try_from_secs_f64(*secs)
                    .map_err(|source| CapabilityError::InvalidSleep { secs: *secs, source })?;
                std::thread::sleep(duration);
                Ok(())
            }
            // Nested steps are run by StepScript::run_steps
            Step::Repeat { .. } => Ok(()),
        }
    }
}

/// A script made of declarative steps, loaded from YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepScript {
    #[serde(skip)]
    path: PathBuf,
    pub steps: Vec<Step>,
}

impl StepScript {
    /// Build a script in memory; `path` is only used for reporting
    pub fn new(path: impl Into<PathBuf>, steps: Vec<Step>) -> Self {
        Self {
            path: path.into(),
            steps,
        }
    }

    /// Load a script from a YAML file
    pub fn load(path: &Path) -> Result<Self, ScriptLoadError> {
        let content = fs::read_to_string(path).map_err(|source| ScriptLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut script: StepScript =
            serde_yaml::from_str(&content).map_err(|source| ScriptLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        script.path = path.to_path_buf();
        if let Some((step, reason)) = invalid_step(&script.steps, "") {
            return Err(ScriptLoadError::InvalidStep {
                path: script.path,
                step,
                reason,
            });
        }
        debug!("Loaded {} steps from {}", script.steps.len(), path.display());
        Ok(script)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    fn run_steps(
        &self,
        steps: &[Step],
        prefix: &str,
        api: &mut dyn Capabilities,
    ) -> Result<(), ScriptError> {
        for (i, step) in steps.iter().enumerate() {
            let index = if prefix.is_empty() {
                (i + 1).to_string()
            } else {
                format!("{}.{}", prefix, i + 1)
            };
            debug!("Step {}: {}", index, step.action());

            if let Step::Repeat { times, steps } = step {
                for _ in 0..*times {
                    self.run_steps(steps, &index, api)?;
                }
                continue;
            }

            step.perform(api).map_err(|err| {
                ScriptError::from(err).at(ScriptLocation::Step {
                    script: self.path.clone(),
                    step: index.clone(),
                    action: step.action(),
                })
            })?;
        }
        Ok(())
    }
}

/// The first step, by its step path, whose values can never run
fn invalid_step(steps: &[Step], prefix: &str) -> Option<(String, String)> {
    steps.iter().enumerate().find_map(|(i, step)| {
        let index = if prefix.is_empty() {
            (i + 1).to_string()
        } else {
            format!("{}.{}", prefix, i + 1)
        };
        match step {
            Step::Sleep { secs } => Duration::try_from_secs_f64(*secs)
                .err()
                .map(|err| (index, format!("sleep of {} seconds: {}", secs, err))),
            Step::Repeat { steps, .. } => invalid_step(steps, &index),
            _ => None,
        }
    })
}

impl Script for StepScript {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn base_dir(&self) -> PathBuf {
        parent_dir(&self.path)
    }

    fn run(&self, api: &mut dyn Capabilities) -> Result<(), ScriptError> {
        self.run_steps(&self.steps, "", api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::capabilities::MatchFound;
    use crate::harness::types::{FailureKind, TimeoutFailure, TimeoutKind};
    use crate::vision::MatchPosition;
    use pretty_assertions::assert_eq;

    /// Records calls; `wait_for_match` times out for images named "missing*"
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Capabilities for Recorder {
        fn press(&mut self, key: &str) -> Result<(), CapabilityError> {
            self.calls.push(format!("press {}", key));
            Ok(())
        }

        fn wait_for_match(
            &mut self,
            image: &str,
            options: &MatchOptions,
        ) -> Result<MatchFound, CapabilityError> {
            self.calls
                .push(format!("wait_for_match {} {}", image, options.timeout_secs));
            if image.starts_with("missing") {
                return Err(CapabilityError::Timeout(TimeoutFailure {
                    kind: TimeoutKind::Match,
                    expected: image.to_string(),
                    timeout_secs: options.timeout_secs,
                    screenshot: None,
                }));
            }
            Ok(MatchFound {
                position: MatchPosition { x: 0, y: 0 },
                first_pass_certainty: 1.0,
                timestamp: Duration::ZERO,
            })
        }

        fn wait_for_motion(&mut self, options: &MotionOptions) -> Result<(), CapabilityError> {
            self.calls.push(format!(
                "wait_for_motion {} {:?}",
                options.consecutive_frames, options.mask
            ));
            Ok(())
        }
    }

    const MENU_SCRIPT: &str = r#"
steps:
  - action: press
    key: MENU
  - action: wait_for_match
    image: menu.png
    timeout_secs: 5
  - action: repeat
    times: 2
    steps:
      - action: press
        key: DOWN
  - action: wait_for_motion
    mask: video.png
  - action: sleep
    secs: 0
"#;

    fn write_script(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("menu.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_and_run_steps() {
        let dir = tempfile::tempdir().unwrap();
        let script = StepScript::load(&write_script(dir.path(), MENU_SCRIPT)).unwrap();
        assert_eq!(script.steps.len(), 5);
        assert_eq!(script.base_dir(), dir.path());

        let mut api = Recorder::default();
        script.run(&mut api).unwrap();
        assert_eq!(
            api.calls,
            vec![
                "press MENU",
                "wait_for_match menu.png 5",
                "press DOWN",
                "press DOWN",
                "wait_for_motion 10 Some(\"video.png\")",
            ]
        );
    }

    #[test]
    fn test_failure_records_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "steps:\n  - action: repeat\n    times: 1\n    steps:\n      - action: press\n        key: OK\n      - action: wait_for_match\n        image: missing.png\n",
        );
        let script = StepScript::load(&path).unwrap();

        let err = script.run(&mut Recorder::default()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(
            err.location,
            Some(ScriptLocation::Step {
                script: path,
                step: "1.2".to_string(),
                action: "wait_for_match",
            })
        );
    }

    #[test]
    fn test_press_until_match_default_presses() {
        let script = StepScript::new(
            "inline.yaml",
            vec![Step::PressUntilMatch {
                key: "RIGHT".to_string(),
                image: "missing.png".to_string(),
                interval_secs: Some(1),
                noise_threshold: None,
                max_presses: Some(2),
            }],
        );
        let mut api = Recorder::default();
        let err = script.run(&mut api).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(
            api.calls,
            vec![
                "wait_for_match missing.png 1",
                "press RIGHT",
                "wait_for_match missing.png 1",
                "press RIGHT",
                "wait_for_match missing.png 1",
            ]
        );
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = StepScript::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ScriptLoadError::Io { .. }));

        let path = write_script(dir.path(), "steps:\n  - action: teleport\n");
        let err = StepScript::load(&path).unwrap_err();
        assert!(matches!(err, ScriptLoadError::Parse { .. }));
        assert!(err.to_string().contains("menu.yaml"));
    }

    #[test]
    fn test_load_rejects_unbounded_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(
            dir.path(),
            "steps:\n  - action: press\n    key: OK\n  - action: repeat\n    times: 2\n    steps:\n      - action: sleep\n        secs: .inf\n",
        );

        let err = StepScript::load(&path).unwrap_err();
        let ScriptLoadError::InvalidStep { step, .. } = &err else {
            panic!("expected an invalid step, got {:?}", err);
        };
        assert_eq!(step, "2.1");
        assert!(err.to_string().contains("menu.yaml"), "{}", err);
    }

    #[test]
    fn test_invalid_sleep_fails_at_its_step() {
        let script = StepScript::new(
            "inline.yaml",
            vec![
                Step::Sleep { secs: 0.0 },
                Step::Sleep { secs: 1e300 },
                Step::Press {
                    key: "OK".to_string(),
                },
            ],
        );
        let mut api = Recorder::default();

        let err = script.run(&mut api).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Other);
        assert_eq!(
            err.location,
            Some(ScriptLocation::Step {
                script: PathBuf::from("inline.yaml"),
                step: "2".to_string(),
                action: "sleep",
            })
        );
        assert!(api.calls.is_empty());

        let negative = StepScript::new("inline.yaml", vec![Step::Sleep { secs: -1.0 }]);
        assert!(negative.run(&mut api).is_err());
    }

    #[test]
    fn test_yaml_omits_unset_options() {
        let script = StepScript::new(
            "recorded.yaml",
            vec![
                Step::Press {
                    key: "OK".to_string(),
                },
                Step::WaitForMatch {
                    image: "0001-OK-complete.png".to_string(),
                    timeout_secs: None,
                    consecutive_matches: None,
                    noise_threshold: None,
                },
            ],
        );
        let yaml = script.to_yaml().unwrap();
        assert!(yaml.contains("action: press"));
        assert!(yaml.contains("image: 0001-OK-complete.png"));
        assert!(!yaml.contains("timeout_secs"));

        let parsed: StepScript = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.steps, script.steps);
    }

    #[test]
    fn test_closure_script() {
        let script = |api: &mut dyn Capabilities| -> Result<(), ScriptError> {
            api.press("OK")?;
            Ok(())
        };
        let mut api = Recorder::default();
        script.run(&mut api).unwrap();
        assert_eq!(script.name(), "<in-process script>");
        assert_eq!(api.calls, vec!["press OK"]);
    }
}
