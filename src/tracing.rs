//! Structured logging setup.
//!
//! Configures the global tracing subscriber with formatted output. The
//! filter honors `RUST_LOG` and defaults to `info`. Secret material never
//! reaches a log statement; nonce values appear at debug only.

use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initializes the global tracing subscriber with formatted output.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_level(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
