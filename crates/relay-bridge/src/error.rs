//! Bridge error type.

/// Errors raised by bridge operations.
///
/// Every transport-level failure surfaces as one of these variants; raw
/// panics or hung futures never cross the bridge boundary. Handlers treat
/// any `Err` the same as a runtime-reported failure: log it and degrade.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// HTTP request failed (unreachable, timeout, bad status body decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The runtime answered with a non-success HTTP status.
    #[error("runtime error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, best effort.
        message: String,
    },
}

impl BridgeError {
    /// Whether retrying the call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Json(_) => false,
        }
    }

    /// Error category string for log fields.
    pub fn category(&self) -> &str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Api { .. } => "api",
        }
    }
}
