//! Transport plumbing shared by both channel kinds.
//!
//! Each session splits its WebSocket into an outbound pump task (forwards
//! queued frames and periodic Pings) and an inbound loop driven through
//! [`next_text`]. The protocol handlers never touch the socket directly —
//! they enqueue frames on the connection and consume decoded text.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use futures::stream::{SplitSink, SplitStream};
use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::Connection;

/// Spawn the outbound pump for a session.
///
/// Forwards messages from the connection's channel onto the socket and
/// sends a Ping every `ping_interval`. Exits when the socket breaks, the
/// channel closes, or the session is cancelled.
pub(crate) fn spawn_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    ping_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        // Skip the immediate first tick.
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Pull the next text payload off the socket.
///
/// Binary frames carrying UTF-8 are treated as text; other binary frames
/// are skipped. Ping/Pong only refresh liveness. Returns `None` once the
/// client closes or the transport drops.
pub(crate) async fn next_text(
    ws_rx: &mut SplitStream<WebSocket>,
    conn: &Connection,
) -> Option<String> {
    loop {
        let msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            _ => return None,
        };
        match msg {
            Message::Text(text) => {
                conn.mark_alive();
                return Some(text.to_string());
            }
            Message::Binary(data) => {
                conn.mark_alive();
                match std::str::from_utf8(&data) {
                    Ok(text) => return Some(text.to_owned()),
                    Err(_) => {
                        debug!(conn_id = %conn.id, len = data.len(), "skipping non-UTF8 binary frame");
                    }
                }
            }
            Message::Close(_) => {
                debug!(conn_id = %conn.id, "client sent close frame");
                return None;
            }
            Message::Ping(_) | Message::Pong(_) => conn.mark_alive(),
        }
    }
}
