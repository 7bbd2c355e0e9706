//! Optional tracing setup for embedding applications.

use tracing_subscriber::EnvFilter;

/// Install a global tracing subscriber honoring `RUST_LOG`.
///
/// Embedders with their own subscriber should skip this; a second call is a
/// no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
