//! Structured logging setup shared by the binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a `fmt` subscriber honouring `RUST_LOG`
///
/// Default level: info for this crate, warn for everything else.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_key_rust=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
