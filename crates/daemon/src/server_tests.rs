// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end specs: a real listener and real WebSocket clients over a
//! fake container backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parlor_adapters::{BackendCall, BackendError, Context, FakeBackend};
use parlor_core::config::ServerConfig;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::*;

type ClientSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    backend: FakeBackend,
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start(pages: Value) -> TestServer {
    let backend = FakeBackend::new();
    start_with(pages, backend).await
}

async fn start_with(pages: Value, backend: FakeBackend) -> TestServer {
    let raw = json!({
        "host": "127.0.0.1",
        "port": 0,
        "context": { "type": "docker" },
        "pages": pages,
    })
    .to_string();
    let config = ServerConfig::from_json(&raw).unwrap();

    let context = Context::with_backend(Arc::new(backend.clone()));
    let server = Server::new(config, context);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(listener, shutdown.clone()));
    TestServer { backend, addr, shutdown }
}

async fn connect(server: &TestServer, path_and_query: &str) -> ClientSocket {
    let url = format!("ws://{}{}", server.addr, path_and_query);
    let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

async fn send(socket: &mut ClientSocket, message: Value) {
    socket.send(Message::text(message.to_string())).await.unwrap();
}

/// Next JSON payload, skipping control frames.
async fn recv(socket: &mut ClientSocket) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).unwrap()
                }
                Some(Ok(_)) => continue,
                other => panic!("socket ended early: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a message")
}

/// The socket closes without delivering further data frames.
async fn expect_close(socket: &mut ClientSocket) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(Message::Text(text))) => panic!("unexpected message: {text}"),
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for close")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached")
}

fn once_page() -> Value {
    json!({
        "/sandbox": {
            "type": "docker",
            "executors": {
                "go": { "type": "once", "image": "alpine", "command": ["echo", "hi"] }
            }
        }
    })
}

fn terminal_page() -> Value {
    json!({
        "/sandbox": {
            "type": "docker",
            "executors": {
                "term": { "type": "always", "image": "busybox", "command": ["sh"], "enable_tty": true }
            }
        }
    })
}

#[tokio::test]
async fn s1_once_trigger_streams_started_output_finished() {
    let server = start(once_page()).await;
    let mut client = connect(&server, "/sandbox/ws?roomName=r").await;

    send(&mut client, json!({ "executor": "go", "message": {} })).await;
    let started = recv(&mut client).await;
    assert_eq!(started, json!({ "executor": "go", "message": { "type": "started" } }));

    let handle = server.backend.attached(&parlor_core::container_name("r", "go")).await;
    handle.push_stdout(b"hi\n");
    handle.close();

    let output = recv(&mut client).await;
    assert_eq!(output["executor"], "go");
    assert_eq!(output["message"]["type"], "output");
    assert_eq!(output["message"]["stdout"], "aGkK");

    let finished = recv(&mut client).await;
    assert_eq!(finished["message"]["type"], "finished");
}

#[tokio::test]
async fn s2_two_sessions_share_a_terminal() {
    let server = start(terminal_page()).await;
    let mut a = connect(&server, "/sandbox/ws?roomName=r").await;
    let mut b = connect(&server, "/sandbox/ws?roomName=r").await;

    let container = parlor_core::container_name("r", "term");
    let mut handle = server.backend.attached(&container).await;

    // B's round trip through the executor proves both sessions are attached.
    send(&mut b, json!({ "executor": "term", "message": { "stdin": "cGluZwo=" } })).await;
    assert_eq!(handle.read_stdin().await.unwrap(), b"ping\n");

    // "echo hello\n" typed by A reaches the shared container...
    send(&mut a, json!({ "executor": "term", "message": { "stdin": "ZWNobyBoZWxsbwo=" } })).await;
    assert_eq!(handle.read_stdin().await.unwrap(), b"echo hello\n");

    // ...and the container's output reaches both sessions.
    handle.push_stdout(b"hello\n");
    for client in [&mut a, &mut b] {
        let output = recv(client).await;
        assert_eq!(output["executor"], "term");
        assert_eq!(output["message"]["stdout"], "aGVsbG8K");
    }
}

#[tokio::test]
async fn s3_last_session_out_tears_down_and_next_gets_a_fresh_room() {
    let server = start(terminal_page()).await;
    let mut a = connect(&server, "/sandbox/ws?roomName=r").await;
    let mut b = connect(&server, "/sandbox/ws?roomName=r").await;

    let volume = parlor_core::volume_name("r");
    let container = parlor_core::container_name("r", "term");
    wait_until(|| server.backend.container_exists(&container)).await;

    // B leaves: the room stays instantiated.
    b.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.backend.volume_exists(&volume));

    // A leaves: sandbox torn down exactly once.
    a.close(None).await.unwrap();
    wait_until(|| !server.backend.volume_exists(&volume)).await;
    wait_until(|| !server.backend.container_exists(&container)).await;

    // A newcomer to the same name observes a fresh instantiation.
    let _c = connect(&server, "/sandbox/ws?roomName=r").await;
    wait_until(|| server.backend.volume_exists(&volume)).await;
    let creates = server
        .backend
        .calls()
        .iter()
        .filter(|call| matches!(call, BackendCall::CreateVolume { .. }))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn s5_create_failure_is_reverted_and_a_retry_succeeds() {
    let backend = FakeBackend::new();
    backend.set_auto_exit_one_shots(true);
    backend.fail_next_create_container(BackendError::Unavailable("transient".to_string()));
    let pages = json!({
        "/sandbox": {
            "type": "docker",
            "executors": {
                "setup": { "type": "prologue", "image": "alpine", "command": ["touch", "/data/x"] }
            }
        }
    });
    let server = start_with(pages, backend).await;

    // Instantiation fails; the server unwinds the session.
    let mut client = connect(&server, "/sandbox/ws?roomName=r").await;
    expect_close(&mut client).await;

    let container = parlor_core::container_name("r", "setup");
    let calls = server.backend.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        BackendCall::DeleteContainer { name, force: true } if *name == container
    )));
    assert!(!server.backend.volume_exists(&parlor_core::volume_name("r")));

    // Reconnecting instantiates cleanly.
    let _client = connect(&server, "/sandbox/ws?roomName=r").await;
    wait_until(|| server.backend.volume_exists(&parlor_core::volume_name("r"))).await;
}

#[tokio::test]
async fn late_joiners_do_not_see_earlier_output() {
    let server = start(terminal_page()).await;
    let mut a = connect(&server, "/sandbox/ws?roomName=r").await;

    let mut handle = server.backend.attached(&parlor_core::container_name("r", "term")).await;
    handle.push_stdout(b"early\n");
    let early = recv(&mut a).await;
    assert_eq!(early["message"]["stdout"], "ZWFybHkK");

    // B joins; a round trip through the executor proves B is attached
    // before more output flows.
    let mut b = connect(&server, "/sandbox/ws?roomName=r").await;
    send(&mut b, json!({ "executor": "term", "message": { "stdin": "cGluZwo=" } })).await;
    assert_eq!(handle.read_stdin().await.unwrap(), b"ping\n");

    handle.push_stdout(b"late\n");
    // B's first output message is the post-join one, not the missed one.
    let late = recv(&mut b).await;
    assert_eq!(late["message"]["stdout"], "bGF0ZQo=");
}

#[tokio::test]
async fn unknown_executor_closes_the_session() {
    let server = start(once_page()).await;
    let mut client = connect(&server, "/sandbox/ws?roomName=r").await;

    send(&mut client, json!({ "executor": "missing", "message": {} })).await;
    expect_close(&mut client).await;
}

#[tokio::test]
async fn non_json_traffic_closes_the_session() {
    let server = start(once_page()).await;
    let mut client = connect(&server, "/sandbox/ws?roomName=r").await;

    client.send(Message::text("not json")).await.unwrap();
    expect_close(&mut client).await;
}

#[tokio::test]
async fn missing_room_name_is_rejected_with_400() {
    let server = start(once_page()).await;
    let url = format!("ws://{}/sandbox/ws", server.addr);
    let error = tokio_tungstenite::connect_async(url).await.unwrap_err();
    match error {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 400);
        }
        other => panic!("expected an HTTP 400, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_page_is_rejected_with_404() {
    let server = start(once_page()).await;
    let url = format!("ws://{}/elsewhere/ws?roomName=r", server.addr);
    let error = tokio_tungstenite::connect_async(url).await.unwrap_err();
    match error {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 404);
        }
        other => panic!("expected an HTTP 404, got {other:?}"),
    }
}

#[tokio::test]
async fn rooms_on_different_pages_are_independent() {
    let pages = json!({
        "/one": {
            "type": "docker",
            "executors": { "go": { "type": "once", "image": "alpine", "command": ["true"] } }
        },
        "/two": {
            "type": "docker",
            "executors": { "go": { "type": "once", "image": "alpine", "command": ["true"] } }
        }
    });
    let server = start(pages).await;

    let _one = connect(&server, "/one/ws?roomName=shared").await;
    let _two = connect(&server, "/two/ws?roomName=other").await;
    wait_until(|| {
        server
            .backend
            .calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::CreateVolume { .. }))
            .count()
            == 2
    })
    .await;
}

#[tokio::test]
async fn room_names_are_percent_decoded() {
    let server = start(once_page()).await;
    let _client = connect(&server, "/sandbox/ws?roomName=my%20room").await;
    wait_until(|| server.backend.volume_exists(&parlor_core::volume_name("my room"))).await;
}
