//! REST fallback for clients without a persistent connection.
//!
//! The surface mirrors the sync channel: reads proxy straight to the
//! bridge, and an accepted write fans out to the partition's WebSocket
//! group so connected clients stay in step with REST writers. The gateway
//! keeps no state catalog of its own — the list endpoint reports the
//! partitions that currently have live connections.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use relay_core::frames::SyncServerFrame;
use relay_core::partition::{DEFAULT_STATE_TYPE, Partition};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::server::AppState;

/// GET /state/ — addresses of partitions with at least one live connection.
pub async fn list_states(State(state): State<AppState>) -> Json<Vec<String>> {
    let addresses = state
        .registry
        .active_partitions()
        .iter()
        .map(Partition::address)
        .collect();
    Json(addresses)
}

/// GET /state/{id} — snapshot of `shared/{id}`, or 404.
pub async fn get_state(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let partition = Partition::new(DEFAULT_STATE_TYPE, id);
    match state.bridge.get_state(&partition).await {
        Ok(Some(data)) => Json(data).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!(partition = %partition, error = %err, "snapshot fetch failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// PUT/POST /state/{id} — write `shared/{id}`, fan out on success.
pub async fn put_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let partition = Partition::new(DEFAULT_STATE_TYPE, id);
    match state.bridge.update_state(&partition, body.clone()).await {
        Ok(ack) if ack.success => {
            let frame = SyncServerFrame::StateUpdate {
                state_type: partition.state_type.clone(),
                state_id: partition.state_id.clone(),
                data: body,
            };
            if let Ok(json) = serde_json::to_string(&frame) {
                let delivered = state
                    .registry
                    .send_to_group(&partition.group_name(), &Arc::new(json));
                debug!(partition = %partition, delivered, "REST write broadcast");
            }
            Json(json!({"status": "success"})).into_response()
        }
        Ok(ack) => {
            warn!(partition = %partition, message = %ack.message, "runtime rejected REST write");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": ack.message})),
            )
                .into_response()
        }
        Err(err) => {
            warn!(partition = %partition, error = %err, "REST write failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": err.to_string()})),
            )
                .into_response()
        }
    }
}
