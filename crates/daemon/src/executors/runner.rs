// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared container-run machinery.
//!
//! `run_once` is the one-shot primitive behind the once/prologue/epilogue
//! variants: create (shielded, revertible), attach stdout+stderr, start,
//! pump frames into the room, and always stop+delete afterwards — even when
//! start or attach failed, and even when the owning task is cancelled
//! mid-pump.

use std::sync::Arc;

use parlor_adapters::{
    AttachOptions, BackendError, ContainerBackend, ContainerSpec, FrameReader,
};
use parlor_core::config::ExecutorConfig;
use parlor_core::protocol;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{ExecutorError, ExecutorShared};
use crate::session::Emitter;
use crate::shield::shield;

/// Run this executor's container once against the room volume.
pub(crate) async fn run_once(shared: &Arc<ExecutorShared>) -> Result<(), ExecutorError> {
    let backend = Arc::clone(shared.context.backend());
    let name = shared.container_name();
    let volume = shared.volume()?;
    let spec = one_shot_spec(&shared.config, &volume);

    create_with_revert(&backend, &name, &spec).await?;
    let cleanup = ContainerCleanup::new(Arc::clone(&backend), name.clone());

    let outcome = attach_and_pump(&backend, &name, &shared.emitter).await;
    let cleaned = cleanup.run().await;
    outcome?;
    cleaned?;
    Ok(())
}

/// Container settings for a one-shot sandboxed run: no network, empty
/// capability set, resource limits from configuration.
pub(crate) fn one_shot_spec(config: &ExecutorConfig, volume: &str) -> ContainerSpec {
    ContainerSpec {
        image: config.image.clone(),
        command: config.command.clone(),
        working_directory: config.working_directory.clone(),
        volume: Some(volume.to_string()),
        network_disabled: true,
        drop_capabilities: true,
        memory_limit_bytes: config.memory_limit_bytes,
        cpu_quota: config.cpu_quota(),
        pids_limit: config.pids_limit,
        ..Default::default()
    }
}

/// Create shielded from cancellation, with a best-effort revert by
/// deterministic name.
///
/// The create runs on a detached task, so a cancellation racing the call
/// cannot leak a container: if the waiter is gone by the time the engine
/// answers, the detached task force-deletes the container it just made.
/// A failed create is reverted the same way before the error surfaces; a
/// 404 means the create never went through and is swallowed, any other
/// revert error replaces the result.
pub(crate) async fn create_with_revert(
    backend: &Arc<dyn ContainerBackend>,
    name: &str,
    spec: &ContainerSpec,
) -> Result<(), ExecutorError> {
    let (created_tx, created_rx) = oneshot::channel::<Result<(), BackendError>>();
    {
        let backend = Arc::clone(backend);
        let name = name.to_string();
        let spec = spec.clone();
        tokio::spawn(async move {
            match backend.create_container(&name, &spec).await {
                Ok(()) => {
                    if created_tx.send(Ok(())).is_err() {
                        // Waiter cancelled between issuance and response.
                        debug!(container = %name, "reverting container creation after cancel");
                        if let Err(error) = backend.delete_container(&name, true).await {
                            if !error.is_not_found() {
                                warn!(container = %name, error = %error, "revert failed");
                            }
                        }
                    }
                }
                Err(error) => {
                    debug!(container = %name, "reverting container creation");
                    let result = match backend.delete_container(&name, true).await {
                        Ok(()) => Err(error),
                        Err(revert_error) if revert_error.is_not_found() => {
                            debug!(container = %name, "container had not been created yet");
                            Err(error)
                        }
                        Err(revert_error) => Err(revert_error),
                    };
                    let _ = created_tx.send(result);
                }
            }
        });
    }
    created_rx
        .await
        .map_err(|_| BackendError::Unavailable("create task dropped".to_string()))??;
    Ok(())
}

async fn attach_and_pump(
    backend: &Arc<dyn ContainerBackend>,
    name: &str,
    emitter: &Emitter,
) -> Result<(), ExecutorError> {
    let io = backend
        .attach(name, AttachOptions { stdout: true, stderr: true, logs: true, stdin: false }, false)
        .await?;
    backend.start_container(name).await?;
    pump_output(io.reader, emitter).await
}

/// Forward output frames to the room until stream EOF (container exit).
pub(crate) async fn pump_output(
    mut reader: Box<dyn FrameReader>,
    emitter: &Emitter,
) -> Result<(), ExecutorError> {
    while let Some(frame) = reader.read_frame().await? {
        emitter.emit(protocol::output(frame.stream, &frame.data));
    }
    Ok(())
}

/// Stop and force-delete, tolerating an already-absent container.
pub(crate) async fn stop_and_delete(
    backend: Arc<dyn ContainerBackend>,
    name: String,
) -> Result<(), BackendError> {
    let mut failure = None;
    match backend.stop_container(&name).await {
        Ok(()) => {}
        Err(error) if error.is_not_found() => {}
        Err(error) => {
            warn!(container = %name, error = %error, "failed to stop container");
            failure = Some(error);
        }
    }
    match backend.delete_container(&name, true).await {
        Ok(()) => {}
        Err(error) if error.is_not_found() => {}
        Err(error) => {
            warn!(container = %name, error = %error, "failed to delete container");
            failure.get_or_insert(error);
        }
    }
    match failure {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

/// Guarantees stop+delete for a created container.
///
/// The normal path calls [`ContainerCleanup::run`], which executes the
/// cleanup shielded. If the owning future is dropped first (task
/// cancellation), `Drop` spawns the same cleanup detached instead.
pub(crate) struct ContainerCleanup {
    backend: Option<Arc<dyn ContainerBackend>>,
    name: String,
}

impl ContainerCleanup {
    pub(crate) fn new(backend: Arc<dyn ContainerBackend>, name: String) -> Self {
        Self { backend: Some(backend), name }
    }

    pub(crate) async fn run(mut self) -> Result<(), ExecutorError> {
        let Some(backend) = self.backend.take() else {
            return Ok(());
        };
        let name = std::mem::take(&mut self.name);
        shield(stop_and_delete(backend, name)).await?;
        Ok(())
    }
}

impl Drop for ContainerCleanup {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.take() {
            let name = std::mem::take(&mut self.name);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = stop_and_delete(backend, name).await;
                });
            }
        }
    }
}
