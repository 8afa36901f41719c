// src/uploads.rs

//! Disk-backed store for attachment blobs.
//!
//! Uploads are written under a generated name and described by a
//! [`FileAttachment`] that clients echo back in `send_file_message`. The chat
//! core never reads the bytes.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::FileAttachment;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Accepted MIME types and the extension used when the upload has none.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
    ("application/msword", "doc"),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", "docx"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file type not allowed: {0}")]
    UnsupportedType(String),

    #[error("file exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("no file uploaded")]
    Empty,

    #[error("malformed upload: {0}")]
    Multipart(String),

    #[error("file not found")]
    NotFound,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Empty | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        if let Self::Io(e) = &self {
            tracing::error!(error = %e, "upload store failure");
        }
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[derive(Debug)]
pub struct UploadStore {
    dir: PathBuf,
    public_url: String,
    max_bytes: usize,
    /// Stored name → descriptor, for download content types
    index: RwLock<HashMap<String, FileAttachment>>,
}

impl UploadStore {
    /// Create the upload directory if needed.
    pub async fn open(
        dir: impl Into<PathBuf>,
        public_url: &str,
        max_bytes: usize,
    ) -> Result<Self, UploadError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_bytes,
            index: RwLock::new(HashMap::new()),
        })
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validate and persist one upload, returning its public descriptor.
    pub async fn store(
        &self,
        bytes: &[u8],
        mimetype: &str,
        original_name: &str,
    ) -> Result<FileAttachment, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge { limit: self.max_bytes });
        }
        let Some(default_ext) = allowed_extension(mimetype) else {
            return Err(UploadError::UnsupportedType(mimetype.to_string()));
        };

        let id = Uuid::new_v4();
        let ext = original_extension(original_name).unwrap_or_else(|| default_ext.to_string());
        let stored_name = format!("{id}.{ext}");
        tokio::fs::write(self.dir.join(&stored_name), bytes).await?;

        let attachment = FileAttachment {
            id: id.to_string(),
            original_name: original_name.to_string(),
            stored_name: stored_name.clone(),
            size: bytes.len() as u64,
            mimetype: mimetype.to_string(),
            url: format!("{}/api/download/{stored_name}", self.public_url),
        };
        tracing::info!(stored = %stored_name, size = attachment.size, mimetype, "stored upload");

        self.index.write().await.insert(stored_name, attachment.clone());
        Ok(attachment)
    }

    /// Bytes and MIME type of a stored file.
    pub async fn retrieve(&self, stored_name: &str) -> Result<(Vec<u8>, String), UploadError> {
        if !is_plain_name(stored_name) {
            return Err(UploadError::NotFound);
        }

        let bytes = match tokio::fs::read(self.dir.join(stored_name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(UploadError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let mimetype = match self.index.read().await.get(stored_name) {
            Some(attachment) => attachment.mimetype.clone(),
            None => mimetype_for(stored_name).to_string(),
        };
        Ok((bytes, mimetype))
    }
}

fn allowed_extension(mimetype: &str) -> Option<&'static str> {
    ALLOWED_TYPES.iter().find(|(mime, _)| *mime == mimetype).map(|(_, ext)| *ext)
}

/// Files left over from an earlier run are not in the index.
fn mimetype_for(stored_name: &str) -> &'static str {
    let ext = Path::new(stored_name).extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        other => ALLOWED_TYPES
            .iter()
            .find(|(_, known)| *known == other)
            .map(|(mime, _)| *mime)
            .unwrap_or("application/octet-stream"),
    }
}

fn original_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    let valid = !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}
