//! Tracing subscriber setup for the binaries.
//!
//! `RUST_LOG` overrides the default `info` level. Logs go to stderr so that
//! reports printed to stdout stay clean.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A subscriber installed earlier wins.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}
