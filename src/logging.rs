//! Process-wide logging initialization.
//!
//! Thin wrapper around `tracing-subscriber`. Initialization is lazy and
//! idempotent: the first caller installs the subscriber, later calls are
//! no-ops. Tests that want to capture output install their own subscriber
//! before touching this module.

use tracing_subscriber::EnvFilter;

/// Install the default process-wide subscriber with an `info` filter
/// (overridable through `RUST_LOG`). No-op if a subscriber is already
/// installed.
pub fn init() {
    init_with_filter("info");
}

/// Install the process-wide subscriber with the given filter directives.
/// No-op if a subscriber is already installed.
pub fn init_with_filter(directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}
