//! Tracing subscriber setup for hosts that embed the engine.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber with env-filter support.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,workline_engine=debug,workline_store=debug"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
