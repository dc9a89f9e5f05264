//! Tracing subscriber setup.
//!
//! Logs go to stderr so `--json` output on stdout stays machine-readable.

use std::io;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive, e.g. `cimsuggest=debug`.
pub const LOG_ENV: &str = "CIM_LOG";

/// Filter used when `CIM_LOG` is unset.
pub fn default_filter(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// Installs the global fmt subscriber. Later calls are no-ops.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(debug)
        .try_init();
}
