//! State-sync channel: one connection, one partition.
//!
//! Lifecycle is connect → connected → closed; a reconnect is a brand-new
//! session with a fresh connection id. On connect the session joins the
//! partition's broadcast group and pushes the current snapshot (when the
//! runtime has one). A client `update_state` that the runtime accepts is
//! fanned out to the whole partition group — including the sender — so
//! every member converges on the accepted value without re-querying.
//!
//! Error policy on this channel: only undecodable input earns an `error`
//! frame. Valid JSON with an unexpected `type` is logged and ignored, and
//! bridge failures degrade silently (no broadcast, no client-visible
//! error). The generic event channel (`events.rs`) is stricter by design.

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use relay_bridge::Bridge;
use relay_core::frames::{DecodeError, SyncClientFrame, SyncServerFrame};
use relay_core::{ConnectionId, Partition};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::Connection;
use super::heartbeat::{HeartbeatOutcome, watch_heartbeat};
use super::registry::ConnectionRegistry;
use super::session::{next_text, spawn_outbound};
use crate::server::AppState;

/// Outbound channel depth per connection.
const SEND_BUFFER: usize = 256;

/// Protocol state for one state-sync connection.
pub struct SyncSession {
    conn: Arc<Connection>,
    partition: Partition,
    registry: Arc<ConnectionRegistry>,
    bridge: Arc<dyn Bridge>,
}

impl SyncSession {
    /// Build a session around an already-registered connection.
    pub fn new(
        conn: Arc<Connection>,
        partition: Partition,
        registry: Arc<ConnectionRegistry>,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        Self {
            conn,
            partition,
            registry,
            bridge,
        }
    }

    /// Fetch the partition snapshot and push it to this client only.
    ///
    /// No snapshot (or a bridge failure) sends nothing — the client simply
    /// starts from unknown state.
    pub async fn push_snapshot(&self) {
        match self.bridge.get_state(&self.partition).await {
            Ok(Some(data)) => {
                let _ = self.conn.send_frame(&self.state_update(data));
            }
            Ok(None) => {
                debug!(partition = %self.partition, "no snapshot available");
            }
            Err(err) => {
                warn!(
                    partition = %self.partition,
                    error = %err,
                    category = err.category(),
                    "snapshot fetch failed"
                );
            }
        }
    }

    /// Handle one decoded-or-not text frame from the client.
    pub async fn handle_text(&self, text: &str) {
        match SyncClientFrame::decode(text) {
            Ok(SyncClientFrame::GetState) => self.push_snapshot().await,
            Ok(SyncClientFrame::UpdateState { data }) => self.apply_update(data).await,
            Err(DecodeError::Malformed(err)) => {
                warn!(conn_id = %self.conn.id, error = %err, "undecodable frame");
                let _ = self.conn.send_frame(&SyncServerFrame::Error {
                    message: "invalid JSON".into(),
                });
            }
            Err(err) => {
                debug!(conn_id = %self.conn.id, error = %err, "ignoring unrecognized message");
            }
        }
    }

    async fn apply_update(&self, data: Value) {
        match self.bridge.update_state(&self.partition, data.clone()).await {
            Ok(ack) if ack.success => {
                let frame = self.state_update(data);
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        let delivered = self
                            .registry
                            .send_to_group(&self.partition.group_name(), &Arc::new(json));
                        debug!(partition = %self.partition, delivered, "state update broadcast");
                    }
                    Err(err) => {
                        error!(error = %err, "failed to serialize state update");
                    }
                }
            }
            Ok(ack) => {
                warn!(
                    partition = %self.partition,
                    message = %ack.message,
                    "runtime rejected state update"
                );
            }
            Err(err) => {
                warn!(
                    partition = %self.partition,
                    error = %err,
                    category = err.category(),
                    "state update failed"
                );
            }
        }
    }

    fn state_update(&self, data: Value) -> SyncServerFrame {
        SyncServerFrame::StateUpdate {
            state_type: self.partition.state_type.clone(),
            state_id: self.partition.state_id.clone(),
            data,
        }
    }
}

/// Drive a state-sync WebSocket from upgrade to disconnect.
pub async fn run_sync_session(socket: WebSocket, partition: Partition, state: AppState) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (send_tx, send_rx) = mpsc::channel(SEND_BUFFER);
    let conn = Arc::new(
        Connection::new(ConnectionId::new(), send_tx).bound_to(partition.clone()),
    );

    state
        .registry
        .register(conn.clone(), &[partition.group_name()]);
    info!(conn_id = %conn.id, partition = %partition, "state sync client connected");

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

    let session = SyncSession::new(
        conn.clone(),
        partition.clone(),
        state.registry.clone(),
        state.bridge.clone(),
    );
    session.push_snapshot().await;

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

    info!(conn_id = %conn.id, partition = %partition, "state sync client disconnected");
    cancel.cancel();
    state.registry.unregister(&conn.id);
    outbound.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_bridge::{BridgeAck, BridgeError, BridgeEventStream};
    use serde_json::json;
    use std::collections::HashMap;

    /// Deterministic in-memory bridge fixture.
    struct StubBridge {
        state: Mutex<HashMap<String, Value>>,
        reject_updates: bool,
    }

    impl StubBridge {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(HashMap::new()),
                reject_updates: false,
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(HashMap::new()),
                reject_updates: true,
            })
        }

        fn seed(self: &Arc<Self>, partition: &Partition, data: Value) {
            let _ = self.state.lock().insert(partition.address(), data);
        }
    }

    #[async_trait]
    impl Bridge for StubBridge {
        async fn get_state(&self, partition: &Partition) -> Result<Option<Value>, BridgeError> {
            Ok(self.state.lock().get(&partition.address()).cloned())
        }
        async fn update_state(
            &self,
            partition: &Partition,
            data: Value,
        ) -> Result<BridgeAck, BridgeError> {
            if self.reject_updates {
                return Ok(BridgeAck::failure("rejected"));
            }
            let _ = self.state.lock().insert(partition.address(), data);
            Ok(BridgeAck::ok())
        }
        async fn send_event(&self, _: &str, _: Value) -> Result<BridgeAck, BridgeError> {
            Ok(BridgeAck::ok())
        }
        async fn stream_events(&self, _: &[String]) -> Result<BridgeEventStream, BridgeError> {
            Ok(Box::pin(futures::stream::pending()))
        }
        async fn close(&self) {}
    }

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        bridge: Arc<StubBridge>,
    }

    impl Fixture {
        fn new(bridge: Arc<StubBridge>) -> Self {
            Self {
                registry: Arc::new(ConnectionRegistry::new()),
                bridge,
            }
        }

        /// Register a connection on `partition` and wrap it in a session.
        fn join(
            &self,
            id: &str,
            partition: &Partition,
        ) -> (SyncSession, mpsc::Receiver<Arc<String>>) {
            let (tx, rx) = mpsc::channel(32);
            let conn =
                Arc::new(Connection::new(id.into(), tx).bound_to(partition.clone()));
            self.registry.register(conn.clone(), &[partition.group_name()]);
            let session = SyncSession::new(
                conn,
                partition.clone(),
                self.registry.clone(),
                self.bridge.clone(),
            );
            (session, rx)
        }
    }

    fn frame(rx: &mut mpsc::Receiver<Arc<String>>) -> Value {
        serde_json::from_str(&rx.try_recv().expect("expected a frame")).unwrap()
    }

    #[tokio::test]
    async fn snapshot_pushed_when_runtime_has_state() {
        let partition = Partition::new("shared", "test");
        let bridge = StubBridge::new();
        bridge.seed(&partition, json!({"message": "hello"}));
        let fixture = Fixture::new(bridge);
        let (session, mut rx) = fixture.join("c1", &partition);

        session.push_snapshot().await;

        let value = frame(&mut rx);
        assert_eq!(value["type"], "state_update");
        assert_eq!(value["state_type"], "shared");
        assert_eq!(value["state_id"], "test");
        assert_eq!(value["data"]["message"], "hello");
    }

    #[tokio::test]
    async fn no_snapshot_sends_nothing() {
        let partition = Partition::default();
        let fixture = Fixture::new(StubBridge::new());
        let (session, mut rx) = fixture.join("c1", &partition);

        session.push_snapshot().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn get_state_message_repeats_the_push() {
        let partition = Partition::default();
        let bridge = StubBridge::new();
        bridge.seed(&partition, json!({"v": 1}));
        let fixture = Fixture::new(bridge);
        let (session, mut rx) = fixture.join("c1", &partition);

        session.handle_text(r#"{"type":"get_state"}"#).await;
        assert_eq!(frame(&mut rx)["data"]["v"], 1);
    }

    #[tokio::test]
    async fn update_broadcasts_to_the_whole_partition() {
        let partition = Partition::new("shared", "doc");
        let fixture = Fixture::new(StubBridge::new());
        let (writer, mut writer_rx) = fixture.join("w", &partition);
        let (_peer, mut peer_rx) = fixture.join("p", &partition);

        writer
            .handle_text(r#"{"type":"update_state","data":{"message":"hello","count":1}}"#)
            .await;

        // Self-inclusion: the writer observes its own update.
        let to_writer = frame(&mut writer_rx);
        assert_eq!(to_writer["type"], "state_update");
        assert_eq!(to_writer["data"]["count"], 1);
        // Peers on the same partition converge on the same value.
        let to_peer = frame(&mut peer_rx);
        assert_eq!(to_peer["data"]["message"], "hello");
    }

    #[tokio::test]
    async fn update_never_leaks_across_partitions() {
        let fixture = Fixture::new(StubBridge::new());
        let p1 = Partition::new("shared", "one");
        let p2 = Partition::new("shared", "two");
        let (writer, mut writer_rx) = fixture.join("w", &p1);
        let (_other, mut other_rx) = fixture.join("o", &p2);

        writer
            .handle_text(r#"{"type":"update_state","data":{"x":1}}"#)
            .await;

        assert!(writer_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_update_broadcasts_nothing() {
        let partition = Partition::default();
        let fixture = Fixture::new(StubBridge::rejecting());
        let (session, mut rx) = fixture.join("c1", &partition);

        session
            .handle_text(r#"{"type":"update_state","data":{"x":1}}"#)
            .await;

        // No broadcast, and no error frame either — the failure is logged only.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_then_get_round_trips_through_the_stub() {
        let partition = Partition::new("shared", "test");
        let bridge = StubBridge::new();
        let fixture = Fixture::new(bridge);
        let (writer, mut writer_rx) = fixture.join("w", &partition);

        writer
            .handle_text(r#"{"type":"update_state","data":{"message":"hello","count":1}}"#)
            .await;
        let _ = writer_rx.try_recv();

        // A second connection on the same partition reads the stored value.
        let (reader, mut reader_rx) = fixture.join("r", &partition);
        reader.handle_text(r#"{"type":"get_state"}"#).await;

        let value = frame(&mut reader_rx);
        assert_eq!(value["data"], json!({"message": "hello", "count": 1}));
    }

    #[tokio::test]
    async fn malformed_input_earns_one_error_and_keeps_the_session() {
        let partition = Partition::default();
        let bridge = StubBridge::new();
        bridge.seed(&partition, json!({"ok": true}));
        let fixture = Fixture::new(bridge);
        let (session, mut rx) = fixture.join("c1", &partition);

        session.handle_text("{{{ definitely not json").await;
        let err = frame(&mut rx);
        assert_eq!(err["type"], "error");
        assert!(rx.try_recv().is_err(), "exactly one error frame");

        // A subsequent valid frame is still processed.
        session.handle_text(r#"{"type":"get_state"}"#).await;
        assert_eq!(frame(&mut rx)["type"], "state_update");
    }

    #[tokio::test]
    async fn unknown_type_is_silently_ignored() {
        let partition = Partition::default();
        let fixture = Fixture::new(StubBridge::new());
        let (session, mut rx) = fixture.join("c1", &partition);

        session.handle_text(r#"{"type":"subscribe","event_types":["a"]}"#).await;
        assert!(rx.try_recv().is_err());
    }
}
