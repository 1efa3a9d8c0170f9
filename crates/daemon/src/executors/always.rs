// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Long-lived interactive executor with stdin and an optional TTY.
//!
//! A supervisor task keeps one container alive for the room's lifetime:
//! create (shielded, revertible), attach all three streams, start, apply
//! any remembered terminal size, signal readiness, then pump output. When
//! the container exits it is stopped and deleted and the loop re-creates
//! it. The loop ends only when `tear_down` cancels the supervisor; the
//! in-flight container is still cleaned up by the shielded drop guard.
//!
//! The remembered TTY size is re-applied after every restart before
//! readiness is signalled, so no input can reach a freshly restarted
//! container ahead of its resize.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parlor_adapters::{AttachOptions, ContainerSpec, StdinWriter};
use parlor_core::config::ExecutorConfig;
use parlor_core::protocol;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{runner, Executor, ExecutorError, ExecutorShared};

/// Pause before re-creating after a failed cycle.
const RESTART_BACKOFF: Duration = Duration::from_millis(500);

pub struct AlwaysExecutor {
    shared: Arc<ExecutorShared>,
    state: Arc<AlwaysState>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

struct AlwaysState {
    /// Flips true once the attached stream accepts traffic, false on exit.
    ready: watch::Sender<bool>,
    stdin: tokio::sync::Mutex<Option<Box<dyn StdinWriter>>>,
    tty_size: Mutex<Option<TtySize>>,
}

#[derive(Debug, Clone, Copy)]
struct TtySize {
    rows: u32,
    cols: u32,
}

impl AlwaysExecutor {
    pub(crate) fn new(shared: Arc<ExecutorShared>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            shared,
            state: Arc::new(AlwaysState {
                ready,
                stdin: tokio::sync::Mutex::new(None),
                tty_size: Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Wait for the attached stream, bounded by `handle_message_timeout`.
    async fn wait_ready(&self) -> Result<(), ExecutorError> {
        let timeout = self.shared.config.handle_message_timeout();
        let mut ready = self.state.ready.subscribe();
        tokio::time::timeout(timeout, ready.wait_for(|ready| *ready))
            .await
            .map_err(|_| ExecutorError::StreamReadyTimeout(timeout))?
            .map_err(|_| ExecutorError::Backend(parlor_adapters::BackendError::StreamClosed))?;
        Ok(())
    }
}

#[async_trait]
impl Executor for AlwaysExecutor {
    async fn instantiate(&self, volume: &str) -> Result<(), ExecutorError> {
        self.shared.bind_volume(volume);
        let shared = Arc::clone(&self.shared);
        let state = Arc::clone(&self.state);
        *self.supervisor.lock() = Some(tokio::spawn(supervise(shared, state)));
        Ok(())
    }

    async fn handle_message(&self, message: Value) -> Result<(), ExecutorError> {
        self.wait_ready().await?;

        if let Some(encoded) = message.get("stdin").and_then(Value::as_str) {
            let data = protocol::decode_base64(encoded)
                .map_err(|error| ExecutorError::InvalidPayload(format!("bad stdin: {error}")))?;
            let mut stdin = self.state.stdin.lock().await;
            let writer = stdin
                .as_mut()
                .ok_or(ExecutorError::Backend(parlor_adapters::BackendError::StreamClosed))?;
            writer.write_stdin(&data).await?;
            return Ok(());
        }

        if let Some(size) = message.get("size") {
            let size = parse_tty_size(size)?;
            debug!(executor = %self.shared.name, rows = size.rows, cols = size.cols, "setting tty size");
            *self.state.tty_size.lock() = Some(size);
            self.shared
                .context
                .backend()
                .resize_tty(&self.shared.container_name(), size.rows, size.cols)
                .await?;
            return Ok(());
        }

        Err(ExecutorError::UnsupportedMessage)
    }

    async fn tear_down(&self) -> Result<(), ExecutorError> {
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let timeout = self.shared.config.tear_down_timeout();
            if tokio::time::timeout(timeout, handle).await.is_err() {
                return Err(ExecutorError::TearDownTimeout(timeout));
            }
        }
        self.shared.clear_volume();
        Ok(())
    }
}

fn parse_tty_size(size: &Value) -> Result<TtySize, ExecutorError> {
    let rows = size.get("rows").and_then(Value::as_u64);
    let cols = size.get("cols").and_then(Value::as_u64);
    match (rows, cols) {
        (Some(rows), Some(cols)) => Ok(TtySize { rows: rows as u32, cols: cols as u32 }),
        _ => Err(ExecutorError::InvalidPayload("size needs rows and cols".to_string())),
    }
}

/// Container settings for the interactive session.
fn interactive_spec(config: &ExecutorConfig, volume: &str) -> ContainerSpec {
    ContainerSpec {
        image: config.image.clone(),
        command: config.command.clone(),
        working_directory: config.working_directory.clone(),
        volume: Some(volume.to_string()),
        attach_stdin: true,
        open_stdin: true,
        stdin_once: true,
        tty: config.enable_tty,
        ..Default::default()
    }
}

/// Restart loop; runs until the supervisor task is cancelled.
async fn supervise(shared: Arc<ExecutorShared>, state: Arc<AlwaysState>) {
    loop {
        match run_session(&shared, &state).await {
            Ok(()) => {
                debug!(executor = %shared.name, "container exited, restarting");
            }
            Err(error) => {
                warn!(executor = %shared.name, error = %error, "interactive container failed, restarting");
                tokio::time::sleep(RESTART_BACKOFF).await;
            }
        }
    }
}

/// One container lifetime: create, attach, start, resize, pump, clean up.
async fn run_session(
    shared: &Arc<ExecutorShared>,
    state: &Arc<AlwaysState>,
) -> Result<(), ExecutorError> {
    let backend = Arc::clone(shared.context.backend());
    let name = shared.container_name();
    let volume = shared.volume()?;
    let spec = interactive_spec(&shared.config, &volume);

    runner::create_with_revert(&backend, &name, &spec).await?;
    let cleanup = runner::ContainerCleanup::new(Arc::clone(&backend), name.clone());

    let outcome = async {
        let io = backend
            .attach(
                &name,
                AttachOptions { stdin: true, stdout: true, stderr: true, logs: true },
                spec.tty,
            )
            .await?;
        *state.stdin.lock().await = Some(io.writer);
        backend.start_container(&name).await?;

        let remembered = *state.tty_size.lock();
        if let Some(size) = remembered {
            debug!(container = %name, rows = size.rows, cols = size.cols, "re-applying tty size");
            backend.resize_tty(&name, size.rows, size.cols).await?;
        }
        let _ = state.ready.send(true);

        runner::pump_output(io.reader, &shared.emitter).await
    }
    .await;

    let _ = state.ready.send(false);
    *state.stdin.lock().await = None;

    let cleaned = cleanup.run().await;
    outcome?;
    cleaned?;
    Ok(())
}

#[cfg(test)]
#[path = "always_tests.rs"]
mod tests;
