// src/lib.rs

pub mod api;
pub mod config;
pub mod conversations;
pub mod error;
pub mod models;
pub mod reactions;
pub mod receipts;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod state;
pub mod uploads;
pub mod websocket;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::state::ChatState;

/// Multipart framing on top of the file itself.
const UPLOAD_BODY_OVERHEAD: usize = 64 * 1024;

/// Build the full axum Router: the event socket, snapshot endpoints and
/// attachment transfer.
pub fn build_router(state: ChatState) -> Router {
    let body_limit = state.uploads.max_bytes() + UPLOAD_BODY_OVERHEAD;

    Router::new()
        .route("/", get(api::index))
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/rooms", get(api::list_rooms))
        .route("/api/rooms/{room_id}/messages", get(api::room_messages))
        .route("/api/users", get(api::list_users))
        .route(
            "/api/upload",
            post(api::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/download/{stored_name}", get(api::download))
        .with_state(state)
}
