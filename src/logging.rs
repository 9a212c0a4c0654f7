//! Logging setup.
//!
//! Logs go to stderr so that `--json` output on stdout stays clean.
//! `RUST_LOG` overrides the verbosity flags.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directives for a `-v` count
pub fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "stb_harness=debug,warn",
        _ => "stb_harness=trace,info",
    }
}

/// Install the global subscriber. Calling it again has no effect.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init();
}
