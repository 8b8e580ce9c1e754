//! REST API handlers for actix-web.

use crate::session::SessionBinder;
use actix_web::{web, HttpResponse};
use discuss_protocol::{ErrorCode, RoomId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state for REST handlers.
pub struct AppState {
    pub binder: Arc<SessionBinder>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
    pub connections: usize,
}

/// GET /rooms - List all rooms.
pub async fn list_rooms(state: web::Data<AppState>) -> HttpResponse {
    let rooms = state.binder.registry().list_rooms().await;
    HttpResponse::Ok().json(rooms)
}

/// POST /rooms - Create a new room.
/// Body: `{"name": "...", "capacity": 4, "password": "..."}`.
pub async fn create_room(body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    let request: CreateRoomRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "invalid create-room body");
            return HttpResponse::BadRequest().json(ErrorResponse {
                error: ErrorCode::InvalidInput,
            });
        }
    };

    let created = state
        .binder
        .create_room(
            None,
            &request.name,
            request.capacity,
            request.password.as_deref(),
        )
        .await;

    match created {
        Ok(room_id) => HttpResponse::Ok().json(CreateRoomResponse { room_id }),
        Err(e) => HttpResponse::BadRequest().json(ErrorResponse {
            error: e.reason().unwrap_or(ErrorCode::InvalidInput),
        }),
    }
}

/// GET /health - Liveness and load.
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        rooms: state.binder.registry().room_count(),
        connections: state.binder.connection_count(),
    })
}
