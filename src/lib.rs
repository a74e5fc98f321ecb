//! Dance Practice - record yourself against a reference dance video.
//!
//! This is the main library crate for the dance practice tool. It provides
//! camera capture, the countdown-gated recording flow synchronized with the
//! reference video, the client for the remote pose analysis service, and the
//! frame comparison timeline.

pub mod api;
pub mod capture;
pub mod comparison;
pub mod config;
pub mod playback;
pub mod recorder;
pub mod results;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dance_practice=debug,reqwest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Dance Practice v{}", env!("CARGO_PKG_VERSION"));
}
