// src/state.rs

use crate::{
    models::{ClientMessage, ConnectionId, ErrorKind},
    router::{Dispatch, EventRouter},
    uploads::UploadStore,
};
use axum::extract::ws::{Message, Utf8Bytes};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Outbound half of a connection: frames pushed here are written to the
/// socket by that connection's writer task.
pub type ClientSender = mpsc::UnboundedSender<Message>;

/// The event core plus the outbox of every open socket.
///
/// All mutation goes through one lock on the hub, and dispatches are queued on
/// the outboxes before the lock is released, so every recipient sees a room's
/// events in the order the router accepted them.
pub struct ChatHub {
    router: EventRouter,
    outboxes: HashMap<ConnectionId, ClientSender>,
}

impl ChatHub {
    pub fn new(router: EventRouter) -> Self {
        Self { router, outboxes: HashMap::new() }
    }

    /// Attach a freshly upgraded socket. It has no session until `user_join`.
    pub fn connect(&mut self, conn: ConnectionId, sender: ClientSender) {
        self.outboxes.insert(conn, sender);
    }

    pub fn handle(&mut self, conn: ConnectionId, event: ClientMessage) {
        let dispatches = self.router.handle(conn, event);
        self.deliver(dispatches);
    }

    /// Answer a frame that could not be parsed into an event.
    pub fn reject(&mut self, conn: ConnectionId, detail: String) {
        tracing::warn!(conn = %conn, error = %detail, "invalid frame");
        let dispatch = EventRouter::error(conn, ErrorKind::InvalidEvent, detail);
        self.deliver(vec![dispatch]);
    }

    /// Drop the socket and tear down its session. Idempotent.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        self.outboxes.remove(&conn);
        let dispatches = self.router.disconnect(conn);
        self.deliver(dispatches);
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    #[cfg(test)]
    fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Serialize each dispatch once and queue it for every recipient still
    /// attached. Closed outboxes are skipped; their reader will disconnect.
    fn deliver(&self, dispatches: Vec<Dispatch>) {
        for Dispatch { recipients, message } in dispatches {
            if recipients.is_empty() {
                continue;
            }
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound event");
                    continue;
                }
            };
            let frame = Message::Text(Utf8Bytes::from(text));
            for recipient in recipients {
                let Some(outbox) = self.outboxes.get(&recipient) else {
                    continue;
                };
                if outbox.send(frame.clone()).is_err() {
                    tracing::debug!(conn = %recipient, "outbox closed, dropping frame");
                }
            }
        }
    }
}

/// The application's shared state, handed to every axum handler.
#[derive(Clone)]
pub struct ChatState {
    pub hub: Arc<Mutex<ChatHub>>,
    pub uploads: Arc<UploadStore>,
}

impl ChatState {
    pub fn new(router: EventRouter, uploads: UploadStore) -> Self {
        Self {
            hub: Arc::new(Mutex::new(ChatHub::new(router))),
            uploads: Arc::new(uploads),
        }
    }
}
