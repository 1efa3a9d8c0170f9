// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container backend contract.
//!
//! The daemon never touches an engine client directly; everything goes
//! through this trait so rooms and executors stay testable against a fake.
//! Containers and volumes are addressed by their deterministic names (see
//! `parlor_core::names`), which keeps resources discoverable without a
//! handle — the create-failure revert path depends on that.

use async_trait::async_trait;
use parlor_core::StreamKind;
use thiserror::Error;

/// Errors from backend operations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Engine unreachable or transport-level failure.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Engine rejected an operation.
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Malformed engine response or stream framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The attached stream went away under an operation.
    #[error("attach stream closed")]
    StreamClosed,
}

impl BackendError {
    /// A 404-equivalent: the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// Everything needed to create a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub working_directory: Option<String>,
    /// Volume mounted at `/data` inside the container.
    pub volume: Option<String>,
    pub attach_stdin: bool,
    pub open_stdin: bool,
    pub stdin_once: bool,
    pub tty: bool,
    pub network_disabled: bool,
    pub memory_limit_bytes: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub pids_limit: Option<i64>,
    /// Run with an empty capability set.
    pub drop_capabilities: bool,
}

/// Which streams to attach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachOptions {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    /// Replay output produced before the attach.
    pub logs: bool,
}

/// One chunk of container output with its stream tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream: StreamKind,
    pub data: Vec<u8>,
}

/// Read half of an attached container stream.
#[async_trait]
pub trait FrameReader: Send {
    /// Next output frame; `None` on stream EOF (container exited).
    async fn read_frame(&mut self) -> Result<Option<Frame>, BackendError>;
}

/// Write half of an attached container stream.
#[async_trait]
pub trait StdinWriter: Send {
    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), BackendError>;
}

/// Attached container I/O, split so the read pump and stdin writers can
/// live on different tasks.
pub struct AttachedIo {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn StdinWriter>,
}

/// The opaque container engine.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Liveness probe; returns the engine version string.
    async fn version(&self) -> Result<String, BackendError>;

    async fn create_volume(&self, name: &str) -> Result<(), BackendError>;

    async fn delete_volume(&self, name: &str) -> Result<(), BackendError>;

    /// Create a container under a deterministic name.
    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<(), BackendError>;

    async fn start_container(&self, name: &str) -> Result<(), BackendError>;

    async fn stop_container(&self, name: &str) -> Result<(), BackendError>;

    async fn delete_container(&self, name: &str, force: bool) -> Result<(), BackendError>;

    /// Attach to the container's streams. `tty` selects the raw (unframed)
    /// wire format.
    async fn attach(
        &self,
        name: &str,
        options: AttachOptions,
        tty: bool,
    ) -> Result<AttachedIo, BackendError>;

    async fn resize_tty(&self, name: &str, rows: u32, cols: u32) -> Result<(), BackendError>;
}
