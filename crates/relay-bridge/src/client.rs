//! The [`Bridge`] trait and its HTTP implementation.
//!
//! The backend runtime owns all partition state and produces the event
//! stream; the gateway only ever talks to it through this facade. The HTTP
//! client is stateless apart from the lazily opened channel: the first call
//! builds the underlying `reqwest::Client`, and [`Bridge::close`] releases
//! it. Reconnection is just the next call rebuilding the channel.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use parking_lot::Mutex;
use relay_core::Partition;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::types::{BridgeAck, BridgeEvent, BridgeEventStream, GetStateEnvelope};

/// Boundary contract with the backend runtime.
///
/// Object-safe so handlers can hold `Arc<dyn Bridge>` and tests can swap in
/// deterministic stubs.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Fetch the current snapshot of a partition.
    ///
    /// `Ok(None)` covers both "partition unknown" and "runtime said no" —
    /// callers cannot distinguish them and must not treat either as fatal.
    async fn get_state(&self, partition: &Partition) -> Result<Option<Value>, BridgeError>;

    /// Replace a partition's state with `data`.
    async fn update_state(
        &self,
        partition: &Partition,
        data: Value,
    ) -> Result<BridgeAck, BridgeError>;

    /// Publish an event into the runtime.
    async fn send_event(&self, event_type: &str, data: Value) -> Result<BridgeAck, BridgeError>;

    /// Open the server-streaming event call.
    ///
    /// An empty `event_types` slice subscribes to everything. The returned
    /// stream runs until the transport drops, then ends; the fan-out worker
    /// re-issues the call to resume.
    async fn stream_events(&self, event_types: &[String])
        -> Result<BridgeEventStream, BridgeError>;

    /// Release the underlying channel. The next call reopens it.
    async fn close(&self);
}

/// HTTP implementation of [`Bridge`].
pub struct HttpBridgeClient {
    base_url: String,
    request_timeout: Duration,
    channel: Mutex<Option<reqwest::Client>>,
}

impl HttpBridgeClient {
    /// Create a client for the runtime at `base_url`.
    ///
    /// `request_timeout` bounds unary calls only; the event stream is
    /// deliberately unbounded.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout,
            channel: Mutex::new(None),
        }
    }

    /// Whether the underlying channel is currently open.
    pub fn is_connected(&self) -> bool {
        self.channel.lock().is_some()
    }

    /// Get the channel, opening it on first use.
    fn channel(&self) -> Result<reqwest::Client, BridgeError> {
        let mut guard = self.channel.lock();
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        debug!(base_url = %self.base_url, "opening bridge channel");
        let client = reqwest::Client::builder().build()?;
        *guard = Some(client.clone());
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post_rpc<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, BridgeError> {
        let client = self.channel()?;
        let response = client
            .post(self.url(path))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[derive(Serialize)]
struct StateRef<'a> {
    state_type: &'a str,
    state_id: &'a str,
}

#[derive(Serialize)]
struct SetStateBody<'a> {
    state_type: &'a str,
    state_id: &'a str,
    state: Value,
}

#[derive(Serialize)]
struct SendEventBody<'a> {
    event_type: &'a str,
    data: Value,
}

#[async_trait]
impl Bridge for HttpBridgeClient {
    async fn get_state(&self, partition: &Partition) -> Result<Option<Value>, BridgeError> {
        let envelope: GetStateEnvelope = self
            .post_rpc(
                "rpc/state/get",
                &StateRef {
                    state_type: &partition.state_type,
                    state_id: &partition.state_id,
                },
            )
            .await?;
        if envelope.success {
            Ok(envelope.state)
        } else {
            debug!(partition = %partition, message = %envelope.message, "runtime has no state");
            Ok(None)
        }
    }

    async fn update_state(
        &self,
        partition: &Partition,
        data: Value,
    ) -> Result<BridgeAck, BridgeError> {
        self.post_rpc(
            "rpc/state/set",
            &SetStateBody {
                state_type: &partition.state_type,
                state_id: &partition.state_id,
                state: data,
            },
        )
        .await
    }

    async fn send_event(&self, event_type: &str, data: Value) -> Result<BridgeAck, BridgeError> {
        self.post_rpc("rpc/event/send", &SendEventBody { event_type, data })
            .await
    }

    async fn stream_events(
        &self,
        event_types: &[String],
    ) -> Result<BridgeEventStream, BridgeError> {
        let client = self.channel()?;
        let mut url = self.url("rpc/events/stream");
        if !event_types.is_empty() {
            url.push_str("?types=");
            url.push_str(&event_types.join(","));
        }

        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // Transport errors end the stream; parse errors skip the event.
        let events = response
            .bytes_stream()
            .eventsource()
            .scan((), |_, item| {
                futures::future::ready(match item {
                    Ok(sse) => match serde_json::from_str::<BridgeEvent>(&sse.data) {
                        Ok(event) => Some(Some(event)),
                        Err(err) => {
                            warn!(error = %err, "skipping undecodable stream event");
                            Some(None)
                        }
                    },
                    Err(err) => {
                        warn!(error = %err, "bridge event stream ended");
                        None
                    }
                })
            })
            .filter_map(|item| async move { item });

        Ok(Box::pin(events))
    }

    async fn close(&self) {
        debug!("closing bridge channel");
        *self.channel.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpBridgeClient {
        HttpBridgeClient::new(server.uri(), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn get_state_returns_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/state/get"))
            .and(body_partial_json(json!({"state_type": "shared", "state_id": "test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "",
                "state": {"message": "hello", "count": 1},
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let snapshot = client
            .get_state(&Partition::new("shared", "test"))
            .await
            .unwrap();
        assert_eq!(snapshot, Some(json!({"message": "hello", "count": 1})));
    }

    #[tokio::test]
    async fn get_state_failure_envelope_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/state/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "unknown partition",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let snapshot = client.get_state(&Partition::default()).await.unwrap();
        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/state/get"))
            .respond_with(ResponseTemplate::new(503).set_body_string("draining"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get_state(&Partition::default()).await.unwrap_err();
        match err {
            BridgeError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "draining");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_state_passes_ack_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/state/set"))
            .and(body_partial_json(json!({"state": {"k": "v"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "stored",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let ack = client
            .update_state(&Partition::default(), json!({"k": "v"}))
            .await
            .unwrap();
        assert!(ack.success);
        assert_eq!(ack.message, "stored");
    }

    #[tokio::test]
    async fn send_event_posts_type_and_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/event/send"))
            .and(body_partial_json(json!({"event_type": "job.done", "data": {"id": 7}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let ack = client.send_event("job.done", json!({"id": 7})).await.unwrap();
        assert!(ack.success);
    }

    #[tokio::test]
    async fn unreachable_runtime_is_retryable_http_error() {
        // Nothing listens on this port.
        let client =
            HttpBridgeClient::new("http://127.0.0.1:1", Duration::from_millis(200));
        let err = client.get_state(&Partition::default()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Http(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn channel_is_lazy_and_closable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/event/send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(!client.is_connected());

        let _ = client.send_event("ping", Value::Null).await.unwrap();
        assert!(client.is_connected());

        client.close().await;
        assert!(!client.is_connected());

        // Next call reopens transparently.
        let _ = client.send_event("ping", Value::Null).await.unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn stream_events_yields_until_body_ends() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"event_type\":\"a\",\"data\":{\"n\":1},\"timestamp\":\"t1\"}\n\n",
            "data: not json\n\n",
            "data: {\"event_type\":\"b\",\"data\":{\"n\":2},\"timestamp\":\"t2\"}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/rpc/events/stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let stream = client.stream_events(&["a".into(), "b".into()]).await.unwrap();
        let events: Vec<BridgeEvent> = stream.collect().await;

        // The malformed line is skipped, the rest arrive in order.
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "a");
        assert_eq!(events[1].event_type, "b");
        assert_eq!(events[1].data, json!({"n": 2}));
    }

    #[tokio::test]
    async fn stream_events_error_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rpc/events/stream"))
            .respond_with(ResponseTemplate::new(500).set_body_string("no stream for you"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.stream_events(&[]).await.err().unwrap();
        assert!(matches!(err, BridgeError::Api { status: 500, .. }));
    }
}
