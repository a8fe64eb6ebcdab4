//! Backoff configuration and calculation for stream recovery.
//!
//! The fan-out worker re-issues the bridge's event stream whenever it ends;
//! the delay between attempts follows capped exponential backoff with
//! jitter. The math here is pure and sync — the worker supplies the random
//! jitter sample and sleeps with tokio.

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Backoff parameters for stream reconnection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// Calculate the delay before attempt `attempt` (zero-based).
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + jitter_sample * jitter_factor)`
///
/// `jitter_sample` must be in `[0.0, 1.0)`; callers draw it from their own
/// randomness source so this function stays deterministic and testable.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_ms(attempt: u32, config: &BackoffConfig, jitter_sample: f64) -> u64 {
    let exp = config
        .base_delay_ms
        .saturating_mul(1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX));
    let capped = exp.min(config.max_delay_ms);
    let jitter = 1.0 + jitter_sample.clamp(0.0, 1.0) * config.jitter_factor.clamp(0.0, 1.0);
    ((capped as f64) * jitter) as u64
}
