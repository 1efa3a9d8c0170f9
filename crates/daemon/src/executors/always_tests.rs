// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use parlor_adapters::{BackendCall, Context, FakeBackend};
use parlor_core::config::{ExecutorConfig, ExecutorKind};
use parlor_core::protocol::Outbound;
use serde_json::json;
use tokio::sync::mpsc;

use super::*;
use crate::executors::build;
use crate::session::{Emitter, SessionHandle, Sessions};

struct Harness {
    backend: FakeBackend,
    executor: Arc<dyn Executor>,
    outbound: mpsc::Receiver<Outbound>,
}

fn executor_config(handle_message_timeout: f64) -> Arc<ExecutorConfig> {
    Arc::new(ExecutorConfig {
        kind: ExecutorKind::Always,
        image: "busybox".to_string(),
        command: vec!["sh".to_string()],
        working_directory: None,
        enable_tty: true,
        memory_limit_bytes: None,
        cpu_limit: None,
        pids_limit: None,
        handle_message_timeout,
        tear_down_timeout: 5.0,
        logger_name: None,
    })
}

fn harness_with(config: Arc<ExecutorConfig>) -> Harness {
    let backend = FakeBackend::new();
    let context = Context::with_backend(Arc::new(backend.clone()));
    let sessions = Arc::new(Sessions::default());
    let (session, outbound) = SessionHandle::new(1);
    sessions.attach(session);
    let emitter = Emitter::new("term".to_string(), sessions);
    let executor = build(&context, config, "r", "term", emitter);
    Harness { backend, executor, outbound }
}

async fn setup() -> Harness {
    let harness = harness_with(executor_config(5.0));
    harness.executor.instantiate("parlor_72").await.unwrap();
    harness
}

fn container() -> String {
    parlor_core::container_name("r", "term")
}

async fn next(outbound: &mut mpsc::Receiver<Outbound>) -> Outbound {
    tokio::time::timeout(Duration::from_secs(5), outbound.recv())
        .await
        .expect("timed out waiting for outbound message")
        .expect("outbound channel closed")
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

#[tokio::test]
async fn stdin_reaches_the_attached_container() {
    let harness = setup().await;
    let mut handle = harness.backend.attached(&container()).await;

    // "echo hello\n"
    harness
        .executor
        .handle_message(json!({ "stdin": "ZWNobyBoZWxsbwo=" }))
        .await
        .unwrap();

    assert_eq!(handle.read_stdin().await.unwrap(), b"echo hello\n");
}

#[tokio::test]
async fn output_fans_out_tagged_with_the_executor() {
    let mut harness = setup().await;
    let handle = harness.backend.attached(&container()).await;

    handle.push_stdout(b"hello\n");

    let output = next(&mut harness.outbound).await;
    assert_eq!(output.executor, "term");
    assert_eq!(output.message["type"], "output");
    assert_eq!(output.message["stdout"], "aGVsbG8K");
}

#[tokio::test]
async fn container_exit_triggers_recreate() {
    let harness = setup().await;
    let handle = harness.backend.attached(&container()).await;
    handle.close();

    // The supervisor deletes the exited container and creates a fresh one.
    harness.backend.attached(&container()).await;
    let creates = harness
        .backend
        .calls()
        .iter()
        .filter(|call| matches!(call, BackendCall::CreateContainer { .. }))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn resize_is_remembered_and_reapplied_after_restart() {
    let harness = setup().await;
    let handle = harness.backend.attached(&container()).await;

    harness
        .executor
        .handle_message(json!({ "size": { "rows": 40, "cols": 120 } }))
        .await
        .unwrap();
    assert!(harness
        .backend
        .calls()
        .iter()
        .any(|call| matches!(call, BackendCall::ResizeTty { rows: 40, cols: 120, .. })));

    // Restart the container; the remembered size must land between the new
    // start and readiness, i.e. before any further input can flow.
    handle.close();
    let mut handle = harness.backend.attached(&container()).await;
    harness
        .executor
        .handle_message(json!({ "stdin": "bHMK" }))
        .await
        .unwrap();
    assert_eq!(handle.read_stdin().await.unwrap(), b"ls\n");

    let calls = harness.backend.calls();
    let second_start = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, BackendCall::StartContainer { .. }))
        .map(|(index, _)| index)
        .nth(1)
        .expect("second start");
    let reapplied_resize = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, BackendCall::ResizeTty { rows: 40, cols: 120, .. }))
        .map(|(index, _)| index)
        .nth(1)
        .expect("re-applied resize");
    assert!(reapplied_resize > second_start, "resize must follow the restart's start");
}

#[tokio::test]
async fn unsupported_payload_is_rejected() {
    let harness = setup().await;
    let _handle = harness.backend.attached(&container()).await;

    let error = harness.executor.handle_message(json!({ "jump": 3 })).await.unwrap_err();
    assert!(matches!(error, ExecutorError::UnsupportedMessage));
}

#[tokio::test]
async fn malformed_stdin_is_invalid_payload() {
    let harness = setup().await;
    let _handle = harness.backend.attached(&container()).await;

    let error = harness
        .executor
        .handle_message(json!({ "stdin": "not base64!!!" }))
        .await
        .unwrap_err();
    assert!(matches!(error, ExecutorError::InvalidPayload(_)));
}

#[tokio::test]
async fn message_times_out_when_stream_never_readies() {
    let harness = harness_with(executor_config(0.05));
    // No instantiate: the supervisor never runs, readiness never flips.
    let error = harness
        .executor
        .handle_message(json!({ "stdin": "aGkK" }))
        .await
        .unwrap_err();
    assert!(matches!(error, ExecutorError::StreamReadyTimeout(_)));
}

#[tokio::test]
async fn cancelling_tear_down_still_stops_and_deletes() {
    let harness = setup().await;
    let _handle = harness.backend.attached(&container()).await;
    assert!(harness.backend.container_running(&container()));

    // Slow the backend so the cancel lands while stop+delete is in flight.
    harness.backend.set_operation_delay(Duration::from_millis(20));
    let executor = Arc::clone(&harness.executor);
    let tearing_down = tokio::spawn(async move { executor.tear_down().await });
    tokio::time::sleep(Duration::from_millis(1)).await;
    tearing_down.abort();
    let _ = tearing_down.await;

    // The shielded cleanup completes anyway: the container is observed
    // stopped and force-deleted after the caller's cancellation.
    wait_until(|| !harness.backend.container_exists(&container())).await;
    let calls = harness.backend.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        BackendCall::StopContainer { name } if *name == container()
    )));
    assert!(calls.iter().any(|call| matches!(
        call,
        BackendCall::DeleteContainer { name, force: true } if *name == container()
    )));
}

#[tokio::test]
async fn tear_down_stops_and_deletes_the_container() {
    let harness = setup().await;
    let _handle = harness.backend.attached(&container()).await;
    assert!(harness.backend.container_running(&container()));

    harness.executor.tear_down().await.unwrap();

    wait_until(|| !harness.backend.container_exists(&container())).await;
    // And the loop is gone: no further creates show up.
    let creates_before = harness
        .backend
        .calls()
        .iter()
        .filter(|call| matches!(call, BackendCall::CreateContainer { .. }))
        .count();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let creates_after = harness
        .backend
        .calls()
        .iter()
        .filter(|call| matches!(call, BackendCall::CreateContainer { .. }))
        .count();
    assert_eq!(creates_before, creates_after);
}
