//! Remote controls for sending key presses to the device under test, and
//! recorders for capturing key presses from a real remote.
//!
//! Controls are selected by URI:
//!
//! | URI | Control |
//! |-----|---------|
//! | `none` | Ignores key presses |
//! | `test` | Switches the `videotestsrc` pattern ("0" to "20") |
//! | `vr:HOST[:PORT]` | VirtualRemote listener on the set-top box (port 2033) |
//! | `lirc:[SOCKET]:NAME` | LIRC infrared blaster via lircd |

pub mod recorder;
pub mod remotes;

use std::io;
use thiserror::Error;

pub use recorder::{
    KeyRecorder, RecordReader, VirtualRemoteListener, lirc_key_reader, uri_to_remote_recorder,
    vr_key_reader,
};
pub use remotes::{
    DEFAULT_LIRCD_SOCKET, DEFAULT_VR_PORT, NullRemote, RemoteControl, TestControl, VirtualRemote,
    uri_to_remote,
};

#[cfg(unix)]
pub use recorder::lirc_remote_listen;
#[cfg(unix)]
pub use remotes::LircRemote;

/// Errors raised by remote controls and recorders
#[derive(Debug, Error)]
pub enum ControlError {
    /// The control URI could not be understood
    #[error("Invalid remote control URI: \"{0}\"")]
    InvalidUri(String),

    /// The control can't be used with the configured source
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The key isn't valid for this control
    #[error("Key \"{key}\" not valid for the \"{control}\" control ({reason})")]
    InvalidKey {
        key: String,
        control: String,
        reason: String,
    },

    /// Could not connect to the remote endpoint
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The control has already been closed
    #[error("The \"{0}\" control has been closed")]
    Closed(String),

    /// I/O error while sending
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
