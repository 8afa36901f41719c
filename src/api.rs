// src/api.rs

//! HTTP side of the server: read-only snapshots of chat state plus the
//! attachment upload and download endpoints.

use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::{
    models::{ChatMessage, RoomInfo, Session},
    state::ChatState,
    uploads::UploadError,
};

/// GET /
pub async fn index() -> &'static str {
    "Chat server is running"
}

/// GET /api/rooms
pub async fn list_rooms(State(state): State<ChatState>) -> Json<Vec<RoomInfo>> {
    let hub = state.hub.lock().await;
    Json(hub.router().rooms().rooms())
}

/// GET /api/rooms/{room_id}/messages
pub async fn room_messages(
    State(state): State<ChatState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, Json<Value>)> {
    let hub = state.hub.lock().await;
    hub.router()
        .rooms()
        .history(&room_id)
        .map(Json)
        .map_err(|e| (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))))
}

/// GET /api/users
pub async fn list_users(State(state): State<ChatState>) -> Json<Vec<Session>> {
    let hub = state.hub.lock().await;
    Json(hub.router().registry().all_sessions())
}

/// POST /api/upload
///
/// Expects a multipart form with a `file` field. Other fields are ignored.
pub async fn upload(
    State(state): State<ChatState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, UploadError> {
    let limit = state.uploads.max_bytes();
    let multipart_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge { limit }
        } else {
            UploadError::Multipart(e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mimetype = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let file = state.uploads.store(&bytes, &mimetype, &original_name).await?;
        return Ok(Json(json!({ "success": true, "file": file })));
    }

    Err(UploadError::Empty)
}

/// GET /api/download/{stored_name}
pub async fn download(
    State(state): State<ChatState>,
    Path(stored_name): Path<String>,
) -> Result<Response, UploadError> {
    let (bytes, mimetype) = state.uploads.retrieve(&stored_name).await?;
    Ok(([(header::CONTENT_TYPE, mimetype)], bytes).into_response())
}
