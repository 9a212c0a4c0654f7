//! Layered configuration.
//!
//! Values are resolved from, lowest to highest precedence:
//! 1. built-in defaults
//! 2. the system config file (`$STBT_SYSTEM_CONFIG`, default `/etc/stbt/stbt.conf`)
//! 3. the user config file (`~/.config/stbt/stbt.conf` on Linux)
//! 4. the file named by `$STBT_CONFIG_FILE`
//! 5. environment variables
//! 6. command-line flags
//!
//! Layers 5 and 6 are applied by the command line parser; this module handles
//! the rest.
//!
//! # Config files
//!
//! Files are TOML. Settings in `[global]` apply to every tool; a tool's own
//! table (`[run]`, `[record]`) overrides them:
//!
//! ```toml
//! [global]
//! source_pipeline = "videotestsrc pattern=0 is-live=true"
//! control = "vr:192.168.0.10"
//!
//! [record]
//! control_recorder = "lirc::My-IR-remote"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `STBT_SOURCE_PIPELINE` | Source description | `videotestsrc is-live=true` |
//! | `STBT_SINK_PIPELINE` | Sink description | `fakesink` |
//! | `STBT_CONTROL` | Remote control URI | `test` |
//! | `STBT_CONFIG_FILE` | Extra config file, read last | unset |
//! | `STBT_SYSTEM_CONFIG` | System config file | `/etc/stbt/stbt.conf` |

use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, TryFromFloatSecsError};
use thiserror::Error;
use tracing::debug;

use crate::session::SessionConfig;

// ============================================================================
// Default Values
// ============================================================================

/// Default source description
pub const DEFAULT_SOURCE_PIPELINE: &str = "videotestsrc is-live=true";

/// Default sink description
pub const DEFAULT_SINK_PIPELINE: &str = "fakesink";

/// Default remote control URI
pub const DEFAULT_CONTROL: &str = "test";

/// Default key recorder URI
pub const DEFAULT_CONTROL_RECORDER: &str = "file:///dev/stdin";

/// Default stream time to wait after each recorded key press (seconds)
pub const DEFAULT_SETTLE_SECS: f64 = 1.0;

/// Default system-wide config file
pub const DEFAULT_SYSTEM_CONFIG: &str = "/etc/stbt/stbt.conf";

/// Name of config files
pub const CONFIG_FILENAME: &str = "stbt.conf";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the source description
pub const ENV_SOURCE_PIPELINE: &str = "STBT_SOURCE_PIPELINE";

/// Environment variable for the sink description
pub const ENV_SINK_PIPELINE: &str = "STBT_SINK_PIPELINE";

/// Environment variable for the control URI
pub const ENV_CONTROL: &str = "STBT_CONTROL";

/// Environment variable naming an extra config file
pub const ENV_CONFIG_FILE: &str = "STBT_CONFIG_FILE";

/// Environment variable overriding the system config file
pub const ENV_SYSTEM_CONFIG: &str = "STBT_SYSTEM_CONFIG";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid settle_secs {value} in {origin}: {source}")]
    InvalidSettle {
        origin: String,
        value: f64,
        #[source]
        source: TryFromFloatSecsError,
    },
}

/// Check a settle time given in seconds, naming where it came from on error
pub fn settle_duration(origin: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|source| ConfigError::InvalidSettle {
        origin: origin.to_string(),
        value: secs,
        source,
    })
}

/// The tool whose config table applies on top of `[global]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Run,
    Record,
}

/// Settings one table of a config file may set
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    source_pipeline: Option<String>,
    sink_pipeline: Option<String>,
    control: Option<String>,
    control_recorder: Option<String>,
    settle_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    global: ConfigLayer,
    #[serde(default)]
    run: ConfigLayer,
    #[serde(default)]
    record: ConfigLayer,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source_pipeline: String,
    pub sink_pipeline: String,
    pub control: String,
    pub control_recorder: String,
    pub settle_secs: f64,
}

impl Config {
    /// Configuration with all defaults (ignoring config files)
    pub fn defaults() -> Self {
        Self {
            source_pipeline: DEFAULT_SOURCE_PIPELINE.to_string(),
            sink_pipeline: DEFAULT_SINK_PIPELINE.to_string(),
            control: DEFAULT_CONTROL.to_string(),
            control_recorder: DEFAULT_CONTROL_RECORDER.to_string(),
            settle_secs: DEFAULT_SETTLE_SECS,
        }
    }

    /// Load defaults overlaid with the standard config files
    pub fn load(tool: Tool) -> Result<Self, ConfigError> {
        Self::load_files(tool, &config_files())
    }

    /// Load defaults overlaid with `files`, in order. Missing files are skipped.
    pub fn load_files(tool: Tool, files: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut config = Self::defaults();
        for path in files {
            config.apply_file(tool, path)?;
        }
        Ok(config)
    }

    fn apply_file(&mut self, tool: Tool, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config file {}", path.display());

        for layer in [&file.global, &file.run, &file.record] {
            if let Some(secs) = layer.settle_secs {
                settle_duration(&path.display().to_string(), secs)?;
            }
        }
        self.apply_layer(file.global);
        self.apply_layer(match tool {
            Tool::Run => file.run,
            Tool::Record => file.record,
        });
        Ok(())
    }

    fn apply_layer(&mut self, layer: ConfigLayer) {
        if let Some(v) = layer.source_pipeline {
            self.source_pipeline = v;
        }
        if let Some(v) = layer.sink_pipeline {
            self.sink_pipeline = v;
        }
        if let Some(v) = layer.control {
            self.control = v;
        }
        if let Some(v) = layer.control_recorder {
            self.control_recorder = v;
        }
        if let Some(v) = layer.settle_secs {
            self.settle_secs = v;
        }
    }

    /// Session settings, with flag or environment values taking precedence
    pub fn session_config(
        &self,
        source_pipeline: Option<&str>,
        sink_pipeline: Option<&str>,
        control: Option<&str>,
    ) -> SessionConfig {
        SessionConfig::new(
            source_pipeline.unwrap_or(&self.source_pipeline),
            sink_pipeline.unwrap_or(&self.sink_pipeline),
            control.unwrap_or(&self.control),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Config files in the order they are applied
pub fn config_files() -> Vec<PathBuf> {
    let mut files = vec![
        env::var_os(ENV_SYSTEM_CONFIG)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSTEM_CONFIG)),
    ];
    if let Some(path) = user_config_path() {
        files.push(path);
    }
    if let Some(path) = env::var_os(ENV_CONFIG_FILE) {
        files.push(PathBuf::from(path));
    }
    files
}

/// Per-user config file
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "stbt").map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}
