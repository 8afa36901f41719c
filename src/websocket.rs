// src/websocket.rs

use crate::{models::ClientMessage, state::ChatState};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitStream, StreamExt},
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// The main handler for WebSocket connections.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ChatState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Manages the lifecycle of a connection. It is anonymous until it sends
/// `user_join`.
async fn handle_socket(socket: WebSocket, state: ChatState) {
    let conn = Uuid::new_v4();
    let (mut sender, receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    state.hub.lock().await.connect(conn, tx);
    tracing::info!(conn = %conn, "client connected");

    // The writer owns the sink so hub handlers never await a socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut receive_task = tokio::spawn(read_from_client(receiver, conn, state.clone()));

    // Whichever side finishes first ends the connection.
    tokio::select! {
        _ = &mut receive_task => send_task.abort(),
        _ = &mut send_task => receive_task.abort(),
    }

    state.hub.lock().await.disconnect(conn);
    tracing::info!(conn = %conn, "client disconnected");
}

/// Reads frames from a client and feeds them to the hub in arrival order.
async fn read_from_client(mut receiver: SplitStream<WebSocket>, conn: Uuid, state: ChatState) {
    while let Some(Ok(frame)) = receiver.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames carry no events.
            _ => continue,
        };

        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(event) => state.hub.lock().await.handle(conn, event),
            Err(e) => state.hub.lock().await.reject(conn, format!("invalid event: {e}")),
        }
    }
}
