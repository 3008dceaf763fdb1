//! Opt-in log output for binaries and tests.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! subscriber is installed, either by the embedding application or with
//! [`init`].

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `shardflow=debug`.
pub const LOG_ENV: &str = "SHARDFLOW_LOG";

static INIT: OnceLock<()> = OnceLock::new();

/// Install a stderr `fmt` subscriber filtered by [`LOG_ENV`] (default `info`).
///
/// Safe to call repeatedly; only the first call has an effect, and a subscriber
/// installed elsewhere is left alone.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    });
}
