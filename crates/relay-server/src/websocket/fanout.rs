//! Event fan-out: subscription table plus the supervised streaming worker.
//!
//! [`EventRouter`] maps event-type strings to the ordered list of subscribed
//! connections. [`FanoutWorker`] keeps the bridge's event stream alive and
//! pushes each arriving event through the router. The worker is owned by the
//! composition root, started once, and supervises itself: a panic or a
//! dropped stream leads to a backoff and a fresh pass, never to a silent
//! stop. Only shutdown cancellation ends it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use relay_bridge::{Bridge, BridgeEvent};
use relay_core::frames::EventServerFrame;
use relay_core::retry::{BackoffConfig, backoff_delay_ms};
use relay_core::ConnectionId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::Connection;

// ─────────────────────────────────────────────────────────────────────────────
// Subscription table
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatch table: event type → subscribed connections, in subscription
/// order. Each subscriber's bounded channel isolates it from its siblings —
/// one full or closed channel never affects the others.
#[derive(Default)]
pub struct EventRouter {
    table: RwLock<HashMap<String, Vec<Arc<Connection>>>>,
}

impl EventRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to an event type. Subscribing the same
    /// connection twice keeps its original position.
    pub fn subscribe(&self, event_type: &str, conn: Arc<Connection>) {
        let mut table = self.table.write();
        let handlers = table.entry(event_type.to_owned()).or_default();
        if !handlers.iter().any(|h| h.id == conn.id) {
            handlers.push(conn);
        }
    }

    /// Remove a connection from one event type.
    pub fn unsubscribe(&self, event_type: &str, id: &ConnectionId) {
        let mut table = self.table.write();
        if let Some(handlers) = table.get_mut(event_type) {
            handlers.retain(|h| &h.id != id);
            if handlers.is_empty() {
                let _ = table.remove(event_type);
            }
        }
    }

    /// Remove a connection from every event type (disconnect path).
    pub fn unsubscribe_all(&self, id: &ConnectionId) {
        let mut table = self.table.write();
        table.retain(|_, handlers| {
            handlers.retain(|h| &h.id != id);
            !handlers.is_empty()
        });
    }

    /// Event types with at least one subscriber.
    pub fn subscribed_types(&self) -> Vec<String> {
        self.table.read().keys().cloned().collect()
    }

    /// Number of subscribers for an event type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.table.read().get(event_type).map_or(0, Vec::len)
    }

    /// Fan one event out to its subscribers.
    ///
    /// Returns the number of successful deliveries. A failed delivery is
    /// logged and skipped; the event still counts as dispatched.
    pub fn dispatch(&self, event: &BridgeEvent) -> usize {
        let handlers: Vec<Arc<Connection>> = {
            let table = self.table.read();
            match table.get(&event.event_type) {
                Some(handlers) => handlers.clone(),
                None => return 0,
            }
        };

        let timestamp = if event.timestamp.is_empty() {
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        } else {
            event.timestamp.clone()
        };
        let frame = EventServerFrame::Event {
            event_type: event.event_type.clone(),
            data: event.data.clone(),
            timestamp,
        };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => Arc::new(json),
            Err(err) => {
                error!(event_type = %event.event_type, error = %err, "failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0;
        for conn in handlers {
            if conn.send(json.clone()) {
                delivered += 1;
            } else {
                warn!(conn_id = %conn.id, event_type = %event.event_type, "failed to deliver event");
            }
        }
        debug!(event_type = %event.event_type, delivered, "event dispatched");
        delivered
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming worker
// ─────────────────────────────────────────────────────────────────────────────

/// How one streaming pass ended.
enum PassOutcome {
    /// Shutdown was requested.
    Cancelled,
    /// The stream ended (or never opened); the supervisor reconnects.
    Ended {
        /// Deliveries made during the pass, used to reset backoff.
        delivered: usize,
    },
}

/// The per-process streaming worker.
///
/// At most one instance runs: [`FanoutWorker::spawn`] is a no-op once the
/// worker is live.
pub struct FanoutWorker {
    bridge: Arc<dyn Bridge>,
    router: Arc<EventRouter>,
    backoff: BackoffConfig,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl FanoutWorker {
    /// Create a worker (not yet started).
    pub fn new(
        bridge: Arc<dyn Bridge>,
        router: Arc<EventRouter>,
        backoff: BackoffConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bridge,
            router,
            backoff,
            cancel,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the supervised loop is currently live.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the supervised loop.
    ///
    /// Returns `false` without doing anything if the worker is already
    /// running — callers may race to start it freely.
    pub fn spawn(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let bridge = self.bridge.clone();
        let router = self.router.clone();
        let backoff = self.backoff.clone();
        let cancel = self.cancel.clone();
        let running = self.running.clone();
        let _ = tokio::spawn(async move {
            supervise(bridge, router, backoff, cancel).await;
            running.store(false, Ordering::SeqCst);
        });
        true
    }
}

async fn supervise(
    bridge: Arc<dyn Bridge>,
    router: Arc<EventRouter>,
    backoff: BackoffConfig,
    cancel: CancellationToken,
) {
    info!("fan-out worker started");
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Each pass runs in its own task so a panic inside the loop body
        // is contained and the supervisor can relaunch.
        let pass = tokio::spawn(run_pass(bridge.clone(), router.clone(), cancel.clone()));
        match pass.await {
            Ok(PassOutcome::Cancelled) => break,
            Ok(PassOutcome::Ended { delivered }) => {
                if delivered > 0 {
                    attempt = 0;
                } else {
                    attempt = attempt.saturating_add(1);
                }
                debug!(delivered, attempt, "event stream ended, reconnecting");
            }
            Err(join_err) => {
                attempt = attempt.saturating_add(1);
                if join_err.is_panic() {
                    error!("fan-out pass panicked, restarting");
                } else {
                    warn!("fan-out pass aborted, restarting");
                }
            }
        }

        let delay = backoff_delay_ms(attempt, &backoff, rand::random::<f64>());
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(Duration::from_millis(delay)) => {}
        }
    }
    info!("fan-out worker stopped");
}

async fn run_pass(
    bridge: Arc<dyn Bridge>,
    router: Arc<EventRouter>,
    cancel: CancellationToken,
) -> PassOutcome {
    // Open the stream unfiltered; the router decides locally who gets
    // what, so subscriptions added mid-pass take effect immediately.
    let mut stream = match bridge.stream_events(&[]).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, category = err.category(), "failed to open event stream");
            return PassOutcome::Ended { delivered: 0 };
        }
    };

    let mut delivered = 0;
    loop {
        tokio::select! {
            () = cancel.cancelled() => return PassOutcome::Cancelled,
            item = stream.next() => match item {
                Some(event) => delivered += router.dispatch(&event),
                None => return PassOutcome::Ended { delivered },
            }
        }
    }
}
