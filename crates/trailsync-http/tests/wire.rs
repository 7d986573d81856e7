//! Requests against a one-shot local HTTP server
//!
//! Run with: cargo test --package trailsync-http --test wire

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use trailsync_core::{RemoteError, RemoteStore, SelectionPayload};
use trailsync_http::{HttpRemoteStore, SseTransport};
use trailsync_realtime::{PushEvent, PushTransport, TransportError};

/// Serve one canned response; the handle yields the raw request text
async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://{addr}/api"), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map_or(0, |v| v.trim().parse::<usize>().unwrap());
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn json_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

#[tokio::test]
async fn fetch_selections_sends_user_id() {
    let body = json!({"data": {"selections": {"selectedItems": ["k1"]}}}).to_string();
    let (base, server) = serve_once(json_response("200 OK", &body)).await;

    let store = HttpRemoteStore::new(base).unwrap();
    let value = store.fetch_selections("learner-1").await.unwrap();
    assert_eq!(value["data"]["selections"]["selectedItems"][0], "k1");

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/learning/selections?userId=learner-1 HTTP/1.1"));
}

#[tokio::test]
async fn save_selections_posts_camel_case_json() {
    let (base, server) = serve_once(json_response("201 Created", "")).await;

    let store = HttpRemoteStore::new(base).unwrap();
    let payload = SelectionPayload {
        user_id: "learner-1".to_string(),
        selected_items: vec!["a".to_string(), "b".to_string()],
    };
    store.save_selections(&payload).await.unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/learning/selections HTTP/1.1"));
    assert!(request.ends_with(r#"{"userId":"learner-1","selectedItems":["a","b"]}"#));
}

#[tokio::test]
async fn server_errors_map_to_status() {
    let (base, server) = serve_once(json_response("503 Service Unavailable", "{}")).await;

    let store = HttpRemoteStore::new(base).unwrap();
    let err = store.fetch_progress().await.unwrap_err();
    assert_eq!(err, RemoteError::Status(503));
    assert!(err.is_transient());
    server.await.unwrap();
}

#[tokio::test]
async fn non_json_body_is_a_body_error() {
    let (base, server) = serve_once(json_response("200 OK", "<html>")).await;

    let store = HttpRemoteStore::new(base).unwrap();
    assert!(matches!(store.fetch_progress().await, Err(RemoteError::Body(_))));
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = HttpRemoteStore::new(format!("http://{addr}/api")).unwrap();
    assert!(matches!(
        store.fetch_selections("u").await,
        Err(RemoteError::Network(_))
    ));
}

#[tokio::test]
async fn event_stream_yields_decoded_events() {
    let response = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n\
                    : hello\n\n\
                    event: progress-update\ndata: {\"route\":\"/katas/a\"}\n\n\
                    data: plain\n\n"
        .to_string();
    let (base, server) = serve_once(response).await;

    let transport = SseTransport::new(base).unwrap();
    let events: Vec<Result<PushEvent, TransportError>> = transport.open("/katas/a").await.unwrap().collect().await;

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/progress/events?route=%2Fkatas%2Fa HTTP/1.1"));
    assert!(request.to_ascii_lowercase().contains("accept: text/event-stream"));
    assert_eq!(
        events,
        vec![
            Ok(PushEvent::new("progress-update", r#"{"route":"/katas/a"}"#)),
            Ok(PushEvent::new("message", "plain")),
        ]
    );
}

#[tokio::test]
async fn event_stream_rejects_error_status() {
    let (base, server) = serve_once(json_response("404 Not Found", "")).await;

    let transport = SseTransport::new(base).unwrap();
    assert_eq!(transport.open("/x").await.err(), Some(TransportError::Status(404)));
    server.await.unwrap();
}
