//! Tracing subscriber setup

use crate::config::TelemetryConfig;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to the
/// configured directive.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
