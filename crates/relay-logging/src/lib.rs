//! # relay-logging
//!
//! Structured logging with `tracing`.
//!
//! The gateway logs with structured fields everywhere; this crate owns the
//! one-time subscriber setup. The filter comes from `RUST_LOG` when set,
//! otherwise from the configured [`LogLevel`]. Output is human-readable by
//! default with an optional JSON formatter for log shippers.

#![deny(unsafe_code)]

pub mod types;

pub use types::LogLevel;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when present. Calling this more
/// than once is harmless — later calls are ignored, which keeps test
/// processes (where many tests race to initialize) quiet.
pub fn init(level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
