//! Integration tests over a real socket: event frames, the HTTP snapshot
//! endpoints and attachment upload/download.

use futures_util::{SinkExt, StreamExt};
use room_chat_server::{
    build_router, router::EventRouter, rooms::RoomStore, state::ChatState, uploads::UploadStore,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start the server on a random port.
async fn start_test_server() -> (SocketAddr, tempfile::TempDir) {
    start_test_server_with_upload_limit(1024 * 1024).await
}

async fn start_test_server_with_upload_limit(max_bytes: usize) -> (SocketAddr, tempfile::TempDir) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let uploads = UploadStore::open(tmp_dir.path(), "http://localhost", max_bytes)
        .await
        .expect("Failed to open upload store");
    let state = ChatState::new(EventRouter::new(RoomStore::default()), uploads);

    let app = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, tmp_dir)
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect");
    socket
}

async fn send(socket: &mut Socket, event: Value) {
    socket.send(Message::Text(event.to_string().into())).await.unwrap();
}

/// Read frames until one with the given `type` arrives.
async fn wait_for(socket: &mut Socket, kind: &str) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
            .expect("socket closed")
            .unwrap();
        let Message::Text(text) = frame else {
            continue;
        };
        let event: Value = serde_json::from_str(text.as_str()).unwrap();
        if event["type"] == kind {
            return event;
        }
    }
}

async fn join(socket: &mut Socket, username: &str) -> Value {
    send(socket, json!({ "type": "user_join", "username": username })).await;
    let user = wait_for(socket, "user_authenticated").await;
    wait_for(socket, "room_joined").await;
    user
}

struct HttpResponse {
    status: u16,
    head: String,
    body: Vec<u8>,
}

impl HttpResponse {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim().to_string())
        })
    }
}

/// One HTTP/1.1 exchange on a fresh connection.
async fn http_exchange(addr: SocketAddr, head: String, body: &[u8]) -> HttpResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(head.as_bytes()).await.unwrap();
    // The server may answer an oversized body before reading all of it.
    let _ = stream.write_all(body).await;

    let mut raw = Vec::new();
    let _ = stream.read_to_end(&mut raw).await;

    let split = raw.windows(4).position(|w| w == b"\r\n\r\n").expect("no response head");
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    let status = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    HttpResponse { status, head, body: raw[split + 4..].to_vec() }
}

/// Plain HTTP/1.1 GET, returning status code and body.
async fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let response = http_download(addr, path).await;
    (response.status, response.text())
}

async fn http_download(addr: SocketAddr, path: &str) -> HttpResponse {
    let head = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    http_exchange(addr, head, &[]).await
}

const BOUNDARY: &str = "chat-test-boundary";

/// POST /api/upload with a single multipart part.
async fn http_upload(
    addr: SocketAddr,
    field: &str,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> HttpResponse {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let head = format!(
        "POST /api/upload HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    http_exchange(addr, head, &body).await
}

#[tokio::test]
async fn join_and_broadcast_over_websocket() {
    let (addr, _tmp) = start_test_server().await;
    let mut ada = connect(addr).await;
    let mut bob = connect(addr).await;

    let user = join(&mut ada, "ada").await;
    assert_eq!(user["user"]["username"], "ada");
    assert_eq!(user["user"]["roomId"], "general");
    assert_eq!(user["user"]["status"], "online");

    join(&mut bob, "bob").await;
    let joined = wait_for(&mut ada, "user_joined").await;
    assert_eq!(joined["username"], "bob");

    send(&mut ada, json!({ "type": "send_message", "content": "hello" })).await;
    for socket in [&mut ada, &mut bob] {
        let event = wait_for(socket, "receive_message").await;
        assert_eq!(event["message"]["content"], "hello");
        assert_eq!(event["message"]["roomId"], "general");
        assert_eq!(event["message"]["type"], "text");
    }
}

#[tokio::test]
async fn malformed_frame_gets_error_and_connection_survives() {
    let (addr, _tmp) = start_test_server().await;
    let mut socket = connect(addr).await;

    socket.send(Message::Text("not json".into())).await.unwrap();
    let error = wait_for(&mut socket, "error").await;
    assert_eq!(error["code"], "invalid_event");

    send(&mut socket, json!({ "type": "send_message", "content": "too early" })).await;
    let error = wait_for(&mut socket, "error").await;
    assert_eq!(error["code"], "not_authenticated");

    let user = join(&mut socket, "late").await;
    assert_eq!(user["user"]["username"], "late");
}

#[tokio::test]
async fn closing_socket_notifies_room() {
    let (addr, _tmp) = start_test_server().await;
    let mut ada = connect(addr).await;
    let mut bob = connect(addr).await;
    join(&mut ada, "ada").await;
    join(&mut bob, "bob").await;

    ada.close(None).await.unwrap();

    let left = wait_for(&mut bob, "user_left").await;
    assert_eq!(left["username"], "ada");
    let list = wait_for(&mut bob, "user_list").await;
    assert_eq!(list["users"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_endpoints() {
    let (addr, _tmp) = start_test_server().await;

    let (status, body) = http_get(addr, "/").await;
    assert_eq!(status, 200);
    assert!(body.contains("running"));

    let (status, body) = http_get(addr, "/api/rooms").await;
    assert_eq!(status, 200);
    let rooms: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(rooms[0]["id"], "general");
    assert_eq!(rooms[1]["id"], "random");

    let (status, _) = http_get(addr, "/api/rooms/attic/messages").await;
    assert_eq!(status, 404);

    let mut ada = connect(addr).await;
    join(&mut ada, "ada").await;
    send(&mut ada, json!({ "type": "send_message", "content": "kept" })).await;
    wait_for(&mut ada, "receive_message").await;

    let (status, body) = http_get(addr, "/api/rooms/general/messages").await;
    assert_eq!(status, 200);
    let messages: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(messages[0]["content"], "kept");

    let (_, body) = http_get(addr, "/api/users").await;
    let users: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(users[0]["username"], "ada");

    let (status, _) = http_get(addr, "/api/download/missing.txt").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn upload_then_download_round_trip() {
    let (addr, _tmp) = start_test_server_with_upload_limit(1024).await;

    let response = http_upload(addr, "file", "notes.txt", "text/plain", b"ten bytes!").await;
    assert_eq!(response.status, 200);
    let body = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["file"]["originalName"], "notes.txt");
    assert_eq!(body["file"]["size"], 10);
    assert_eq!(body["file"]["mimetype"], "text/plain");

    let stored_name = body["file"]["storedName"].as_str().unwrap().to_string();
    assert_eq!(
        body["file"]["url"],
        format!("http://localhost/api/download/{stored_name}").as_str()
    );

    let download = http_download(addr, &format!("/api/download/{stored_name}")).await;
    assert_eq!(download.status, 200);
    assert_eq!(download.header("content-type").as_deref(), Some("text/plain"));
    assert_eq!(download.body, b"ten bytes!");
}

#[tokio::test]
async fn upload_rejections_report_failure_body() {
    let (addr, _tmp) = start_test_server_with_upload_limit(1024).await;

    let response = http_upload(addr, "file", "evil.bin", "application/x-evil", b"payload").await;
    assert_eq!(response.status, 415);
    assert_eq!(response.json()["success"], false);
    assert!(response.json()["error"].as_str().unwrap().contains("not allowed"));

    // Over the store's ceiling but inside the request body limit.
    let response = http_upload(addr, "file", "big.txt", "text/plain", &vec![b'a'; 2000]).await;
    assert_eq!(response.status, 413);
    assert_eq!(response.json()["success"], false);

    let response = http_upload(addr, "attachment", "notes.txt", "text/plain", b"hello").await;
    assert_eq!(response.status, 400);
    assert_eq!(response.json()["success"], false);
}

#[tokio::test]
async fn upload_over_body_limit_is_too_large() {
    let (addr, _tmp) = start_test_server_with_upload_limit(1024).await;

    let response = http_upload(addr, "file", "huge.txt", "text/plain", &vec![b'a'; 70_000]).await;
    assert_eq!(response.status, 413);
}
