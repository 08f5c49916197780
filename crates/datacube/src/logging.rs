//! Tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Map a `-v` count to a default filter level.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `verbosity`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init(verbosity: u8, json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));

    let builder = fmt().with_env_filter(filter).with_target(true).with_level(true);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
