//! JSON wire frames for the two WebSocket channel kinds.
//!
//! Every frame is a JSON object with a `type` discriminator. Decoding is a
//! two-step affair so handlers can tell apart the three client mistakes that
//! carry different policies: text that is not JSON at all, a `type` the
//! channel does not know, and a known `type` with a bad payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why an incoming text frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The text was not valid JSON.
    #[error("invalid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The JSON object had no string `type` field.
    #[error("message has no `type` field")]
    MissingType,

    /// The `type` is not part of this channel's vocabulary.
    #[error("unknown message type `{0}`")]
    UnknownType(String),

    /// The `type` is known but the payload did not match its shape.
    #[error("invalid `{frame_type}` payload: {source}")]
    InvalidPayload {
        /// The frame type whose payload failed to decode.
        frame_type: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

fn decode_tagged<T: DeserializeOwned>(text: &str, known: &[&str]) -> Result<T, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let Some(frame_type) = value.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::MissingType);
    };
    if !known.contains(&frame_type) {
        return Err(DecodeError::UnknownType(frame_type.to_owned()));
    }
    let frame_type = frame_type.to_owned();
    serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload {
        frame_type,
        source,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// State-sync channel
// ─────────────────────────────────────────────────────────────────────────────

/// Client frames on a state-sync channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncClientFrame {
    /// Re-request the partition snapshot.
    GetState,
    /// Replace the partition state.
    UpdateState {
        /// The new state value.
        data: Value,
    },
}

impl SyncClientFrame {
    /// Frame types this channel accepts.
    pub const TYPES: &'static [&'static str] = &["get_state", "update_state"];

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        decode_tagged(text, Self::TYPES)
    }
}

/// Server frames on a state-sync channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncServerFrame {
    /// The current (or just-accepted) partition state.
    StateUpdate {
        /// Partition namespace.
        state_type: String,
        /// Partition id.
        state_id: String,
        /// Snapshot or accepted value.
        data: Value,
    },
    /// Protocol error; the connection stays open.
    Error {
        /// Human-readable description.
        message: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic-event channel
// ─────────────────────────────────────────────────────────────────────────────

/// Client frames on a generic-event channel.
///
/// `AgentCommand` / `MlCommand` are only honored on the matching role
/// channel; elsewhere they are treated as an unknown type by the handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventClientFrame {
    /// Liveness probe; the timestamp is echoed back verbatim.
    Ping {
        /// Client-supplied timestamp, opaque to the server.
        #[serde(default)]
        timestamp: Value,
    },
    /// Subscribe this connection to the named event types.
    Subscribe {
        /// Event types to add.
        event_types: Vec<String>,
    },
    /// Remove this connection from the named event types.
    Unsubscribe {
        /// Event types to remove.
        event_types: Vec<String>,
    },
    /// Publish an event through the bridge.
    Event {
        /// Type of the published event.
        event_type: String,
        /// Event payload.
        #[serde(default)]
        data: Value,
    },
    /// Agent-channel command, repackaged into a generic event.
    AgentCommand {
        /// Command verb.
        command: String,
        /// Command payload.
        #[serde(default)]
        data: Value,
    },
    /// ML-channel command, repackaged into a generic event.
    MlCommand {
        /// Command verb.
        command: String,
        /// Command payload.
        #[serde(default)]
        data: Value,
    },
}

impl EventClientFrame {
    /// Frame types this channel accepts (role frames included; the handler
    /// rejects the ones its role does not carry).
    pub const TYPES: &'static [&'static str] = &[
        "ping",
        "subscribe",
        "unsubscribe",
        "event",
        "agent_command",
        "ml_command",
    ];

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        decode_tagged(text, Self::TYPES)
    }
}

/// Server frames on a generic-event channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventServerFrame {
    /// First frame after accept, carrying the assigned connection id.
    ConnectionEstablished {
        /// Id assigned to this connection.
        consumer_id: String,
    },
    /// Reply to `ping`.
    Pong {
        /// The timestamp the client sent.
        timestamp: Value,
    },
    /// Acknowledges a `subscribe`.
    Subscribed {
        /// Event types that were added.
        event_types: Vec<String>,
    },
    /// Acknowledges an `unsubscribe`.
    Unsubscribed {
        /// Event types that were removed.
        event_types: Vec<String>,
    },
    /// Acknowledges an `event` publish.
    EventSent {
        /// Type of the published event.
        event_type: String,
    },
    /// A fanned-out event from the backend runtime.
    Event {
        /// Event type.
        event_type: String,
        /// Event payload.
        data: Value,
        /// Runtime-assigned timestamp.
        timestamp: String,
    },
    /// Protocol or request error; the connection stays open.
    Error {
        /// Human-readable description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── decode paths ────────────────────────────────────────────────

    #[test]
    fn decode_get_state() {
        let frame = SyncClientFrame::decode(r#"{"type":"get_state"}"#).unwrap();
        assert_eq!(frame, SyncClientFrame::GetState);
    }

    #[test]
    fn decode_update_state() {
        let frame =
            SyncClientFrame::decode(r#"{"type":"update_state","data":{"count":1}}"#).unwrap();
        assert_eq!(
            frame,
            SyncClientFrame::UpdateState {
                data: json!({"count": 1})
            }
        );
    }

    #[test]
    fn malformed_text_is_malformed() {
        let err = SyncClientFrame::decode("not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn missing_type_field() {
        let err = SyncClientFrame::decode(r#"{"data":{}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingType));
    }

    #[test]
    fn non_string_type_field() {
        let err = SyncClientFrame::decode(r#"{"type":42}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingType));
    }

    #[test]
    fn unknown_type_names_the_offender() {
        let err = SyncClientFrame::decode(r#"{"type":"subscribe"}"#).unwrap_err();
        match err {
            DecodeError::UnknownType(t) => assert_eq!(t, "subscribe"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn known_type_bad_payload() {
        let err = SyncClientFrame::decode(r#"{"type":"update_state"}"#).unwrap_err();
        match err {
            DecodeError::InvalidPayload { frame_type, .. } => {
                assert_eq!(frame_type, "update_state");
            }
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn event_missing_event_type_is_invalid_payload() {
        let err = EventClientFrame::decode(r#"{"type":"event","data":{}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPayload { .. }));
    }

    #[test]
    fn ping_timestamp_defaults_to_null() {
        let frame = EventClientFrame::decode(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(
            frame,
            EventClientFrame::Ping {
                timestamp: Value::Null
            }
        );
    }

    #[test]
    fn ping_timestamp_is_opaque() {
        let frame = EventClientFrame::decode(r#"{"type":"ping","timestamp":1723.5}"#).unwrap();
        assert_eq!(
            frame,
            EventClientFrame::Ping {
                timestamp: json!(1723.5)
            }
        );
    }

    #[test]
    fn decode_subscribe_list() {
        let frame =
            EventClientFrame::decode(r#"{"type":"subscribe","event_types":["a","b"]}"#).unwrap();
        assert_eq!(
            frame,
            EventClientFrame::Subscribe {
                event_types: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn decode_agent_command() {
        let frame =
            EventClientFrame::decode(r#"{"type":"agent_command","command":"run","data":{"x":1}}"#)
                .unwrap();
        assert_eq!(
            frame,
            EventClientFrame::AgentCommand {
                command: "run".into(),
                data: json!({"x": 1})
            }
        );
    }

    // ── encode shapes ───────────────────────────────────────────────

    #[test]
    fn state_update_wire_shape() {
        let frame = SyncServerFrame::StateUpdate {
            state_type: "shared".into(),
            state_id: "test".into(),
            data: json!({"message": "hello"}),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "state_update");
        assert_eq!(value["state_type"], "shared");
        assert_eq!(value["state_id"], "test");
        assert_eq!(value["data"]["message"], "hello");
    }

    #[test]
    fn connection_established_wire_shape() {
        let frame = EventServerFrame::ConnectionEstablished {
            consumer_id: "c-1".into(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "connection_established");
        assert_eq!(value["consumer_id"], "c-1");
    }

    #[test]
    fn pong_echoes_timestamp() {
        let frame = EventServerFrame::Pong {
            timestamp: json!(99),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "pong");
        assert_eq!(value["timestamp"], 99);
    }

    #[test]
    fn fanout_event_wire_shape() {
        let frame = EventServerFrame::Event {
            event_type: "task.done".into(),
            data: json!({"id": "t1"}),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event_type"], "task.done");
        assert_eq!(value["data"]["id"], "t1");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn error_wire_shape() {
        let frame = EventServerFrame::Error {
            message: "bad frame".into(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "bad frame");
    }

    #[test]
    fn server_frame_roundtrip() {
        let frame = EventServerFrame::Subscribed {
            event_types: vec!["a".into()],
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: EventServerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
