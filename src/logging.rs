//! Optional tracing subscriber wiring.
//!
//! The engine only emits `tracing` events; embedding applications own the
//! subscriber. This helper installs a sensible default for binaries and
//! tests that do not bring their own.

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber honoring `RUST_LOG`. Safe to call
/// more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
