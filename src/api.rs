//! HTTP API endpoints.
//!
//! Rooms are created over HTTP; everything that happens inside a room goes
//! over the WebSocket.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{room_id}/users", post(check_room))
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({"status": "healthy", "store": "connected"})).into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "unhealthy", "store": e.to_string()})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomRequest {
    pub name: Option<String>,
}

/// Create a waiting room.
///
/// POST /api/rooms
///
/// The body is optional; `{"name": ".."}` overrides the default `Room <id>`.
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateRoomRequest>>,
) -> Response {
    let name = body.and_then(|Json(req)| req.name);
    match state.create_room(name).await {
        Ok(room) => {
            tracing::info!("Created room {}", room.id);
            (
                StatusCode::CREATED,
                Json(json!({"success": true, "room": room})),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Room creation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// Check that a room exists before a client opens its socket.
///
/// POST /api/rooms/{room_id}/users
pub async fn check_room(State(state): State<Arc<AppState>>, Path(room_id): Path<String>) -> Response {
    match state.room_exists(&room_id).await {
        Ok(true) => Json(json!({"success": true, "room_id": room_id})).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": "Room not found"})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Room lookup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}
