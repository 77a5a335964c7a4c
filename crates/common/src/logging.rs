//! Tracing setup shared by the API process and any standalone worker binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialise a `tracing` subscriber honouring `RUST_LOG` if set, falling back to `level`
/// scoped to this workspace's crates plus `tower_http` at debug.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("agentic_run={level},tower_http=debug")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(%level, "tracing initialized");
}
