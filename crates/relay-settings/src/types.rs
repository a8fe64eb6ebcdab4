//! Settings schema.
//!
//! Every struct carries per-field serde defaults so partial user files
//! deep-merge cleanly over the compiled defaults.

use relay_core::BackoffConfig;
use relay_logging::LogLevel;
use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Gateway server settings.
    pub server: ServerSettings,
    /// Backend-runtime bridge settings.
    pub bridge: BridgeSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// WebSocket/HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server-initiated pings in ms.
    pub heartbeat_interval_ms: u64,
    /// Close a connection after this long without a pong, in ms.
    pub heartbeat_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8200,
            max_connections: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 1024 * 1024, // 1 MB
        }
    }
}

/// Bridge (backend runtime) settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Base address of the backend runtime RPC surface.
    pub address: String,
    /// Per-request timeout in ms for unary bridge calls.
    pub request_timeout_ms: u64,
    /// Backoff applied between event-stream reconnect attempts.
    pub stream_backoff: BackoffConfig,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8600".into(),
            request_timeout_ms: 10_000,
            stream_backoff: BackoffConfig::default(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level emitted (overridden by `RUST_LOG`).
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}
