//! Ping/pong liveness monitoring.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::Connection;

/// Outcome of the heartbeat watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The session shut down first.
    Cancelled,
}

/// Watch a connection's liveness.
///
/// Every `interval` the alive flag is checked and reset. A connection that
/// shows no life for `timeout / interval` consecutive checks (at least one)
/// is reported as [`HeartbeatOutcome::TimedOut`]; the session closes it.
/// The outbound pump sends the actual Ping frames — this task only watches
/// the responses.
pub async fn watch_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatOutcome {
    let mut ticker = time::interval(interval);
    // The first tick fires immediately; skip it so the client gets a full
    // interval before the first check.
    let _ = ticker.tick().await;

    let interval_ms = interval.as_millis().max(1);
    #[allow(clippy::cast_possible_truncation)]
    let max_missed = ((timeout.as_millis() / interval_ms) as u32).max(1);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatOutcome::TimedOut;
                    }
                }
                connection.is_alive.store(false, Ordering::Relaxed);
            }
            () = cancel.cancelled() => {
                return HeartbeatOutcome::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_connection() -> Arc<Connection> {
        let (tx, _rx) = mpsc::channel(32);
        Arc::new(Connection::new("hb".into(), tx))
    }

    #[tokio::test]
    async fn cancelled_before_any_check() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let watch = tokio::spawn(watch_heartbeat(
            conn,
            Duration::from_secs(60),
            Duration::from_secs(180),
            cancel.clone(),
        ));

        cancel.cancel();
        assert_eq!(watch.await.unwrap(), HeartbeatOutcome::Cancelled);
    }

    #[tokio::test]
    async fn silent_connection_times_out() {
        let conn = make_connection();
        conn.is_alive.store(false, Ordering::Relaxed);

        let outcome = watch_heartbeat(
            conn,
            Duration::from_millis(10),
            Duration::from_millis(10),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, HeartbeatOutcome::TimedOut);
    }

    #[tokio::test]
    async fn responsive_connection_stays_up() {
        let conn = make_connection();
        let cancel = CancellationToken::new();

        let keepalive_conn = conn.clone();
        let keepalive = tokio::spawn(async move {
            for _ in 0..10 {
                keepalive_conn.mark_alive();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let watch = tokio::spawn(watch_heartbeat(
            conn,
            Duration::from_millis(10),
            Duration::from_millis(30),
            cancel.clone(),
        ));

        keepalive.await.unwrap();
        cancel.cancel();
        assert_eq!(watch.await.unwrap(), HeartbeatOutcome::Cancelled);
    }
}
