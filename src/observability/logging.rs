//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a configured log level.
pub fn default_directive(level: &str) -> String {
    format!("tunnel_gateway={level},tower_http={level}")
}

/// Initialize the global tracing subscriber.
pub fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
