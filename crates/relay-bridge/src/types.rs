//! Bridge wire types.
//!
//! Payloads are arbitrary JSON objects end to end: the WebSocket protocol in
//! front of the bridge carries free-form `data`, and the runtime's HTTP
//! surface accepts and returns the same.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uniform acknowledgement returned by unary bridge calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeAck {
    /// Whether the runtime accepted the call.
    pub success: bool,
    /// Runtime-supplied detail, empty on success.
    #[serde(default)]
    pub message: String,
}

impl BridgeAck {
    /// A successful acknowledgement.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    /// A failed acknowledgement with a reason.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// One event pulled from the runtime's event stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    /// Event type the runtime assigned.
    pub event_type: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
    /// Runtime-assigned timestamp (RFC 3339).
    #[serde(default)]
    pub timestamp: String,
}

/// Lazy, unbounded stream of runtime events.
///
/// The stream ends (yields `None`) on transport failure; callers restart it
/// by re-issuing `stream_events`.
pub type BridgeEventStream = Pin<Box<dyn Stream<Item = BridgeEvent> + Send>>;

/// Response envelope for `get_state`.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct GetStateEnvelope {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub state: Option<Value>,
}
