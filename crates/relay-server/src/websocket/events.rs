//! Generic-event channel: ad hoc publish/subscribe over the same substrate.
//!
//! Unlike the state-sync channel, this one answers every client mistake
//! with an explicit `error` frame: malformed JSON, an unknown `type`, a bad
//! payload, and empty subscribe/unsubscribe lists all get one. The
//! connection always stays open — malformed input is recoverable.
//!
//! Role channels (`agent`, `ml`) run the identical state machine with one
//! extra fixed group joined at connect time and one extra message type that
//! repackages a role command into a generic event publish.

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use relay_bridge::Bridge;
use relay_core::frames::{DecodeError, EventClientFrame, EventServerFrame};
use relay_core::ConnectionId;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::fanout::EventRouter;
use super::heartbeat::{HeartbeatOutcome, watch_heartbeat};
use super::registry::ConnectionRegistry;
use super::session::{next_text, spawn_outbound};
use crate::server::AppState;

/// Catch-all group every event connection joins.
pub const BASE_GROUP: &str = "broadcast";

/// Outbound channel depth per connection.
const SEND_BUFFER: usize = 256;

/// Which flavor of event channel a connection came in on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelRole {
    /// Plain publish/subscribe.
    Events,
    /// Agent-scoped traffic; joins the `agents` group and accepts
    /// `agent_command`.
    Agent,
    /// ML-scoped traffic; joins the `ml` group and accepts `ml_command`.
    Ml,
}

impl ChannelRole {
    /// Extra fixed group joined at connect time, if any.
    pub fn extra_group(self) -> Option<&'static str> {
        match self {
            Self::Events => None,
            Self::Agent => Some("agents"),
            Self::Ml => Some("ml"),
        }
    }

    /// Event type that role commands are packaged under.
    fn command_event_type(self) -> &'static str {
        match self {
            Self::Events => "command",
            Self::Agent => "agent_command",
            Self::Ml => "ml_command",
        }
    }
}

/// Protocol state for one generic-event connection.
pub struct EventSession {
    conn: Arc<Connection>,
    role: ChannelRole,
    registry: Arc<ConnectionRegistry>,
    router: Arc<EventRouter>,
    bridge: Arc<dyn Bridge>,
}

impl EventSession {
    /// Build a session around an already-registered connection.
    pub fn new(
        conn: Arc<Connection>,
        role: ChannelRole,
        registry: Arc<ConnectionRegistry>,
        router: Arc<EventRouter>,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        Self {
            conn,
            role,
            registry,
            router,
            bridge,
        }
    }

    /// Handle one text frame from the client.
    pub async fn handle_text(&self, text: &str) {
        match EventClientFrame::decode(text) {
            Ok(EventClientFrame::Ping { timestamp }) => {
                let _ = self.conn.send_frame(&EventServerFrame::Pong { timestamp });
            }
            Ok(EventClientFrame::Subscribe { event_types }) => {
                if event_types.is_empty() {
                    self.send_error("subscribe requires at least one event type");
                    return;
                }
                for event_type in &event_types {
                    self.router.subscribe(event_type, self.conn.clone());
                }
                debug!(conn_id = %self.conn.id, ?event_types, "subscribed");
                let _ = self
                    .conn
                    .send_frame(&EventServerFrame::Subscribed { event_types });
            }
            Ok(EventClientFrame::Unsubscribe { event_types }) => {
                if event_types.is_empty() {
                    self.send_error("unsubscribe requires at least one event type");
                    return;
                }
                for event_type in &event_types {
                    self.router.unsubscribe(event_type, &self.conn.id);
                }
                debug!(conn_id = %self.conn.id, ?event_types, "unsubscribed");
                let _ = self
                    .conn
                    .send_frame(&EventServerFrame::Unsubscribed { event_types });
            }
            Ok(EventClientFrame::Event { event_type, data }) => {
                self.publish(event_type, data).await;
            }
            Ok(EventClientFrame::AgentCommand { command, data }) => {
                self.role_command(ChannelRole::Agent, "agent_command", command, data)
                    .await;
            }
            Ok(EventClientFrame::MlCommand { command, data }) => {
                self.role_command(ChannelRole::Ml, "ml_command", command, data)
                    .await;
            }
            Err(DecodeError::Malformed(err)) => {
                warn!(conn_id = %self.conn.id, error = %err, "undecodable frame");
                self.send_error("invalid JSON");
            }
            Err(DecodeError::MissingType) => {
                self.send_error("message has no `type` field");
            }
            Err(DecodeError::UnknownType(frame_type)) => {
                self.send_error(format!("unknown message type `{frame_type}`"));
            }
            Err(DecodeError::InvalidPayload { frame_type, .. }) => {
                self.send_error(format!("invalid `{frame_type}` payload"));
            }
        }
    }

    /// Unregister this connection everywhere (disconnect path).
    pub fn disconnect(&self) {
        self.registry.unregister(&self.conn.id);
        self.router.unsubscribe_all(&self.conn.id);
    }

    /// Publish through the bridge and ack the client.
    ///
    /// The ack is optimistic: it goes out even when the runtime rejects or
    /// the bridge call fails, which are logged. Fire-and-forget by design.
    async fn publish(&self, event_type: String, data: Value) {
        match self.bridge.send_event(&event_type, data).await {
            Ok(ack) if !ack.success => {
                warn!(event_type = %event_type, message = %ack.message, "runtime rejected event");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    event_type = %event_type,
                    error = %err,
                    category = err.category(),
                    "event publish failed"
                );
            }
        }
        let _ = self
            .conn
            .send_frame(&EventServerFrame::EventSent { event_type });
    }

    /// A role command is only honored on its own channel; elsewhere it is
    /// treated like any other unknown type.
    async fn role_command(
        &self,
        required: ChannelRole,
        frame_type: &str,
        command: String,
        data: Value,
    ) {
        if self.role != required {
            self.send_error(format!("unknown message type `{frame_type}`"));
            return;
        }
        let event_type = self.role.command_event_type().to_owned();
        self.publish(event_type, json!({"command": command, "data": data}))
            .await;
    }

    fn send_error(&self, message: impl Into<String>) {
        let _ = self.conn.send_frame(&EventServerFrame::Error {
            message: message.into(),
        });
    }
}

/// Groups an event connection joins at connect time.
pub fn connect_groups(role: ChannelRole, principal: Option<&str>) -> Vec<String> {
    let mut groups = vec![BASE_GROUP.to_owned()];
    if let Some(principal) = principal {
        groups.push(format!("user:{principal}"));
    }
    if let Some(extra) = role.extra_group() {
        groups.push(extra.to_owned());
    }
    groups
}

/// Drive a generic-event WebSocket from upgrade to disconnect.
pub async fn run_event_session(
    socket: WebSocket,
    role: ChannelRole,
    principal: Option<String>,
    state: AppState,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (send_tx, send_rx) = mpsc::channel(SEND_BUFFER);
    let conn = Arc::new(Connection::new(ConnectionId::new(), send_tx));

    let groups = connect_groups(role, principal.as_deref());
    state.registry.register(conn.clone(), &groups);
    info!(conn_id = %conn.id, ?role, ?groups, "event client connected");

    let _ = conn.send_frame(&EventServerFrame::ConnectionEstablished {
        consumer_id: conn.id.to_string(),
    });

    let cancel = CancellationToken::new();
    let outbound = spawn_outbound(
        ws_tx,
        send_rx,
        state.config.heartbeat_interval(),
        cancel.clone(),
    );
    let mut heartbeat = tokio::spawn(watch_heartbeat(
        conn.clone(),
        state.config.heartbeat_interval(),
        state.config.heartbeat_timeout(),
        cancel.clone(),
    ));

    let session = EventSession::new(
        conn.clone(),
        role,
        state.registry.clone(),
        state.router.clone(),
        state.bridge.clone(),
    );

    loop {
        tokio::select! {
            text = next_text(&mut ws_rx, &conn) => match text {
                Some(text) => session.handle_text(&text).await,
                None => break,
            },
            outcome = &mut heartbeat => {
                if matches!(outcome, Ok(HeartbeatOutcome::TimedOut)) {
                    warn!(conn_id = %conn.id, "client unresponsive, closing");
                }
                break;
            }
        }
    }

    info!(conn_id = %conn.id, "event client disconnected");
    cancel.cancel();
    session.disconnect();
    outbound.abort();
}
