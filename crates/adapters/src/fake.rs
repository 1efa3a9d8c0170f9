// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake container backend for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::{
    AttachOptions, AttachedIo, BackendError, ContainerBackend, ContainerSpec, Frame, FrameReader,
    StdinWriter,
};

/// Recorded call to FakeBackend
#[derive(Debug, Clone)]
pub enum BackendCall {
    CreateVolume { name: String },
    DeleteVolume { name: String },
    CreateContainer { name: String },
    StartContainer { name: String },
    StopContainer { name: String },
    DeleteContainer { name: String, force: bool },
    Attach { name: String },
    ResizeTty { name: String, rows: u32, cols: u32 },
}

/// Fake container backend for testing
///
/// Records every call, keeps in-memory volume/container registries, and
/// lets tests script failures and drive attached streams by hand.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<BackendCall>,
    volumes: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    /// Stream handles waiting to be claimed by the test, by container name.
    handles: HashMap<String, FakeStreamHandle>,
    create_volume_errors: Vec<BackendError>,
    delete_volume_errors: Vec<BackendError>,
    create_container_errors: Vec<BackendError>,
    delete_container_errors: Vec<BackendError>,
    stop_errors: Vec<BackendError>,
    auto_exit_one_shots: bool,
    operation_delay: Option<Duration>,
}

struct FakeContainer {
    spec: ContainerSpec,
    running: bool,
}

/// Test-side handle to one attached stream: push output frames, observe
/// stdin writes. Dropping the handle ends the stream (container exit).
pub struct FakeStreamHandle {
    frames: mpsc::UnboundedSender<Frame>,
    stdin: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl FakeStreamHandle {
    pub fn push_stdout(&self, data: &[u8]) {
        let _ = self
            .frames
            .send(Frame { stream: parlor_core::StreamKind::Stdout, data: data.to_vec() });
    }

    pub fn push_stderr(&self, data: &[u8]) {
        let _ = self
            .frames
            .send(Frame { stream: parlor_core::StreamKind::Stderr, data: data.to_vec() });
    }

    /// End the output stream; the pump observes the container exiting.
    pub fn close(self) {}

    /// Next chunk written to the container's stdin.
    pub async fn read_stdin(&mut self) -> Option<Vec<u8>> {
        self.stdin.recv().await
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    /// Clear recorded calls
    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn volume_exists(&self, name: &str) -> bool {
        self.inner.lock().volumes.contains(name)
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.inner.lock().containers.contains_key(name)
    }

    pub fn container_running(&self, name: &str) -> bool {
        self.inner.lock().containers.get(name).is_some_and(|container| container.running)
    }

    /// Make one-shot runs (no stdin attached) finish immediately: their
    /// attach streams EOF at once instead of waiting for the test.
    pub fn set_auto_exit_one_shots(&self, enabled: bool) {
        self.inner.lock().auto_exit_one_shots = enabled;
    }

    /// Delay every subsequent backend operation, so tests can race
    /// cancellation against in-flight calls.
    pub fn set_operation_delay(&self, delay: Duration) {
        self.inner.lock().operation_delay = Some(delay);
    }

    async fn maybe_delay(&self) {
        let delay = self.inner.lock().operation_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Set error to return on next volume create
    pub fn fail_next_create_volume(&self, error: BackendError) {
        self.inner.lock().create_volume_errors.push(error);
    }

    pub fn fail_next_delete_volume(&self, error: BackendError) {
        self.inner.lock().delete_volume_errors.push(error);
    }

    /// Set error to return on next container create
    pub fn fail_next_create_container(&self, error: BackendError) {
        self.inner.lock().create_container_errors.push(error);
    }

    pub fn fail_next_delete_container(&self, error: BackendError) {
        self.inner.lock().delete_container_errors.push(error);
    }

    pub fn fail_next_stop(&self, error: BackendError) {
        self.inner.lock().stop_errors.push(error);
    }

    /// Wait until the named container has been attached and claim the
    /// test-side stream handle.
    pub async fn attached(&self, name: &str) -> FakeStreamHandle {
        loop {
            if let Some(handle) = self.inner.lock().handles.remove(name) {
                return handle;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn not_found(what: &str, name: &str) -> BackendError {
        BackendError::Api { status: 404, message: format!("no such {what}: {name}") }
    }

    fn conflict(message: String) -> BackendError {
        BackendError::Api { status: 409, message }
    }
}

#[async_trait]
impl ContainerBackend for FakeBackend {
    async fn version(&self) -> Result<String, BackendError> {
        Ok("fake".to_string())
    }

    async fn create_volume(&self, name: &str) -> Result<(), BackendError> {
        self.maybe_delay().await;
        let mut state = self.inner.lock();
        state.calls.push(BackendCall::CreateVolume { name: name.to_string() });
        if !state.create_volume_errors.is_empty() {
            return Err(state.create_volume_errors.remove(0));
        }
        if !state.volumes.insert(name.to_string()) {
            return Err(Self::conflict(format!("volume {name} already exists")));
        }
        Ok(())
    }

    async fn delete_volume(&self, name: &str) -> Result<(), BackendError> {
        self.maybe_delay().await;
        let mut state = self.inner.lock();
        state.calls.push(BackendCall::DeleteVolume { name: name.to_string() });
        if !state.delete_volume_errors.is_empty() {
            return Err(state.delete_volume_errors.remove(0));
        }
        if !state.volumes.remove(name) {
            return Err(Self::not_found("volume", name));
        }
        Ok(())
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<(), BackendError> {
        self.maybe_delay().await;
        let mut state = self.inner.lock();
        state.calls.push(BackendCall::CreateContainer { name: name.to_string() });
        if !state.create_container_errors.is_empty() {
            return Err(state.create_container_errors.remove(0));
        }
        if state.containers.contains_key(name) {
            return Err(Self::conflict(format!("container {name} already exists")));
        }
        state
            .containers
            .insert(name.to_string(), FakeContainer { spec: spec.clone(), running: false });
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), BackendError> {
        self.maybe_delay().await;
        let mut state = self.inner.lock();
        state.calls.push(BackendCall::StartContainer { name: name.to_string() });
        match state.containers.get_mut(name) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(Self::not_found("container", name)),
        }
    }

    async fn stop_container(&self, name: &str) -> Result<(), BackendError> {
        self.maybe_delay().await;
        let mut state = self.inner.lock();
        state.calls.push(BackendCall::StopContainer { name: name.to_string() });
        if !state.stop_errors.is_empty() {
            return Err(state.stop_errors.remove(0));
        }
        match state.containers.get_mut(name) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(Self::not_found("container", name)),
        }
    }

    async fn delete_container(&self, name: &str, force: bool) -> Result<(), BackendError> {
        self.maybe_delay().await;
        let mut state = self.inner.lock();
        state.calls.push(BackendCall::DeleteContainer { name: name.to_string(), force });
        if !state.delete_container_errors.is_empty() {
            return Err(state.delete_container_errors.remove(0));
        }
        let Some(container) = state.containers.get(name) else {
            return Err(Self::not_found("container", name));
        };
        let running = container.running;
        if running && !force {
            return Err(Self::conflict(format!("container {name} is running")));
        }
        state.containers.remove(name);
        // A removed container's stream ends.
        state.handles.remove(name);
        Ok(())
    }

    async fn attach(
        &self,
        name: &str,
        _options: AttachOptions,
        _tty: bool,
    ) -> Result<AttachedIo, BackendError> {
        self.maybe_delay().await;
        let mut state = self.inner.lock();
        state.calls.push(BackendCall::Attach { name: name.to_string() });
        let Some(container) = state.containers.get(name) else {
            return Err(Self::not_found("container", name));
        };
        let auto_exit = state.auto_exit_one_shots && !container.spec.attach_stdin;

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        if auto_exit {
            // No handle stored: the sender drops here and the reader sees EOF.
            drop(frames_tx);
        } else {
            state
                .handles
                .insert(name.to_string(), FakeStreamHandle { frames: frames_tx, stdin: stdin_rx });
        }
        Ok(AttachedIo {
            reader: Box::new(FakeFrameReader { frames: frames_rx }),
            writer: Box::new(FakeStdinWriter { stdin: stdin_tx }),
        })
    }

    async fn resize_tty(&self, name: &str, rows: u32, cols: u32) -> Result<(), BackendError> {
        self.maybe_delay().await;
        let mut state = self.inner.lock();
        state.calls.push(BackendCall::ResizeTty { name: name.to_string(), rows, cols });
        if !state.containers.contains_key(name) {
            return Err(Self::not_found("container", name));
        }
        Ok(())
    }
}

struct FakeFrameReader {
    frames: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameReader for FakeFrameReader {
    async fn read_frame(&mut self) -> Result<Option<Frame>, BackendError> {
        Ok(self.frames.recv().await)
    }
}

struct FakeStdinWriter {
    stdin: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl StdinWriter for FakeStdinWriter {
    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), BackendError> {
        self.stdin.send(data.to_vec()).map_err(|_| BackendError::StreamClosed)
    }
}
