//! `RelayServer` — Axum HTTP + WebSocket gateway assembly.
//!
//! The server is the composition point: one connection registry, one event
//! router, one fan-out worker, one shutdown coordinator. Nothing here is a
//! global — handlers get what they need through [`AppState`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use relay_bridge::Bridge;
use relay_core::retry::BackoffConfig;
use relay_core::Partition;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::http;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::events::{ChannelRole, run_event_session};
use crate::websocket::fanout::{EventRouter, FanoutWorker};
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::sync::run_sync_session;

/// Header carrying the authenticated principal, set by the fronting auth
/// layer. Authentication itself is outside this process.
pub const PRINCIPAL_HEADER: &str = "x-relay-principal";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: ServerConfig,
    /// Directory of live connections and groups.
    pub registry: Arc<ConnectionRegistry>,
    /// Event subscription table.
    pub router: Arc<EventRouter>,
    /// Bridge to the backend runtime.
    pub bridge: Arc<dyn Bridge>,
    /// The fan-out worker handle.
    pub worker: Arc<FanoutWorker>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The relay gateway server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Assemble a server around a bridge client.
    pub fn new(
        config: ServerConfig,
        bridge: Arc<dyn Bridge>,
        stream_backoff: BackoffConfig,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(EventRouter::new());
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let worker = Arc::new(FanoutWorker::new(
            bridge.clone(),
            router.clone(),
            stream_backoff,
            shutdown.token(),
        ));
        Self {
            state: AppState {
                config,
                registry,
                router,
                bridge,
                worker,
                shutdown,
                start_time: Instant::now(),
            },
        }
    }

    /// Start the fan-out worker. Safe to call more than once.
    pub fn start_worker(&self) -> bool {
        self.state.worker.spawn()
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/state", get(http::state::list_states))
            .route("/state/", get(http::state::list_states))
            .route(
                "/state/{id}",
                get(http::state::get_state)
                    .put(http::state::put_state)
                    .post(http::state::put_state),
            )
            .route("/ws/state", get(sync_ws_default))
            .route("/ws/state/{state_type}/{state_id}", get(sync_ws))
            .route("/ws/events", get(events_ws))
            .route("/ws/agent", get(agent_ws))
            .route("/ws/ml", get(ml_ws))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve. Returns the bound address and the serve task.
    ///
    /// The serve task exits when the shutdown coordinator cancels.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind((
            self.state.config.host.as_str(),
            self.state.config.port,
        ))
        .await?;
        let addr = listener.local_addr()?;
        info!(%addr, "gateway listening");

        let app = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %err, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// Get the event router.
    pub fn event_router(&self) -> &Arc<EventRouter> {
        &self.state.router
    }

    /// Get the fan-out worker.
    pub fn worker(&self) -> &Arc<FanoutWorker> {
        &self.state.worker
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.group_count(),
        state.worker.is_running(),
    );
    Json(resp)
}

fn principal_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

fn at_capacity(state: &AppState) -> bool {
    state.registry.connection_count() >= state.config.max_connections
}

/// GET /ws/state — sync channel on the default partition.
async fn sync_ws_default(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    sync_upgrade(state, ws, Partition::default())
}

/// GET /ws/state/{state_type}/{state_id}
async fn sync_ws(
    State(state): State<AppState>,
    Path((state_type, state_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    sync_upgrade(state, ws, Partition::new(state_type, state_id))
}

fn sync_upgrade(state: AppState, ws: WebSocketUpgrade, partition: Partition) -> Response {
    if at_capacity(&state) {
        warn!(partition = %partition, "refusing connection, at capacity");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_sync_session(socket, partition, state))
}

/// GET /ws/events
async fn events_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    event_upgrade(state, ws, ChannelRole::Events, principal_from(&headers))
}

/// GET /ws/agent
async fn agent_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    event_upgrade(state, ws, ChannelRole::Agent, principal_from(&headers))
}

/// GET /ws/ml
async fn ml_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    event_upgrade(state, ws, ChannelRole::Ml, principal_from(&headers))
}

fn event_upgrade(
    state: AppState,
    ws: WebSocketUpgrade,
    role: ChannelRole,
    principal: Option<String>,
) -> Response {
    if at_capacity(&state) {
        warn!(?role, "refusing connection, at capacity");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_event_session(socket, role, principal, state))
}
