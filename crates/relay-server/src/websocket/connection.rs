//! Per-connection handle.
//!
//! A `Connection` owns the sending half of one client's outbound channel and
//! the liveness bookkeeping for heartbeats. The receiving half lives with
//! the session task that pumps messages onto the actual WebSocket. Lookup
//! and group membership are the registry's business, not this type's.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::{ConnectionId, Partition};
use serde::Serialize;
use tokio::sync::mpsc;

/// One live client connection.
pub struct Connection {
    /// Unique id, minted at connect time.
    pub id: ConnectionId,
    /// Partition this connection is bound to (state-sync channels only).
    partition: Option<Partition>,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// When the last pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped because the channel was full or closed.
    pub dropped_messages: AtomicU64,
}

impl Connection {
    /// Create a new unbound connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            partition: None,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Bind this connection to a state partition (builder form, used at
    /// construction — a connection never changes partition afterwards).
    #[must_use]
    pub fn bound_to(mut self, partition: Partition) -> Self {
        self.partition = Some(partition);
        self
    }

    /// The partition this connection is bound to, if any.
    pub fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    /// Enqueue a text message for delivery.
    ///
    /// Fire-and-forget: returns `false` and bumps the drop counter when the
    /// channel is full or the session is gone. Callers must treat a failed
    /// send as a skipped delivery, never an error.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a frame and enqueue it.
    pub fn send_frame<T: Serialize>(&self, frame: &T) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last sign of life.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the connection showed life since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
