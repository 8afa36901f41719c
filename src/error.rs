// src/error.rs

use crate::models::{ConnectionId, ErrorKind, MessageId, RoomId};
use thiserror::Error;

/// Failures detected by the event core.
///
/// None of these are fatal to a connection. The router turns each one into an
/// `error` event addressed to the actor only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("user not authenticated")]
    NotAuthenticated,

    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("recipient is offline: {0}")]
    RecipientOffline(ConnectionId),

    #[error("connection already registered: {0}")]
    AlreadyRegistered(ConnectionId),
}

impl ChatError {
    /// Wire-level category reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated => ErrorKind::NotAuthenticated,
            Self::RoomNotFound(_) | Self::MessageNotFound(_) | Self::RecipientOffline(_) => {
                ErrorKind::NotFound
            }
            Self::AlreadyRegistered(_) => ErrorKind::Internal,
        }
    }
}

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
