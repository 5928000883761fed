//! Tracing setup for binaries and long-lived services.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Install the global subscriber: `RUST_LOG`-driven filtering (default
/// `info`), compact formatting, and span traces attached to errors.
///
/// Idempotent; later calls are no-ops so tests and embedding applications
/// can both call it freely.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .with(ErrorLayer::default())
            .init();
    });
}
