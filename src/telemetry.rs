//! Tracing bootstrap.
//!
//! The engine itself only emits `tracing` events; wiring them to an output
//! is the embedding application's choice. This helper installs a sensible
//! default subscriber (env-filtered fmt output plus span traces on errors)
//! for binaries and tests that don't bring their own.

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the default subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(ErrorLayer::default())
        .try_init();
}
