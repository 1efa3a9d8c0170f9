// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor variants: container workloads bound to a room's data volume.
//!
//! Every executor shares one shape — `instantiate(volume)`,
//! `handle_message(payload)`, `tear_down()` — and differs in when its
//! container runs:
//!
//! - `once` — a session trigger starts one run in the background
//! - `prologue` — runs during room instantiation, before any interaction
//! - `epilogue` — runs during tear-down, before the volume is destroyed
//! - `always` — keeps a long-lived container with stdin attached, restarted
//!   whenever it exits
//!
//! The construction-time [`Emitter`] tags everything an executor sends
//! with its name, so sessions can demultiplex.

mod always;
mod epilogue;
mod once;
mod prologue;
mod runner;

pub use always::AlwaysExecutor;
pub use epilogue::EpilogueExecutor;
pub use once::OnceExecutor;
pub use prologue::PrologueExecutor;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parlor_adapters::{BackendError, Context};
use parlor_core::config::{ExecutorConfig, ExecutorKind};
use serde_json::Value;
use thiserror::Error;

use crate::session::Emitter;

/// Errors from executor operations.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The attached stream did not become ready within `handle_message_timeout`.
    #[error("stream not ready within {0:?}")]
    StreamReadyTimeout(Duration),

    /// The supervisor did not wind down within `tear_down_timeout`.
    #[error("tear down timed out after {0:?}")]
    TearDownTimeout(Duration),

    /// The client sent a payload this executor cannot handle.
    #[error("unsupported message")]
    UnsupportedMessage,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// An operation needed the room volume before `instantiate` ran.
    #[error("executor not instantiated")]
    NotInstantiated,
}

/// A named unit inside a room that runs one container workload.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Bind the room's data volume; variant-specific startup.
    async fn instantiate(&self, volume: &str) -> Result<(), ExecutorError>;

    /// Handle a session payload routed to this executor.
    async fn handle_message(&self, message: Value) -> Result<(), ExecutorError>;

    /// Release containers and tasks. Must tolerate partial instantiation.
    async fn tear_down(&self) -> Result<(), ExecutorError>;
}

/// Construct the variant named by the configuration's closed `type` set.
pub fn build(
    context: &Context,
    config: Arc<ExecutorConfig>,
    room_name: &str,
    name: &str,
    emitter: Emitter,
) -> Arc<dyn Executor> {
    let shared = Arc::new(ExecutorShared::new(context.clone(), config.clone(), room_name, name, emitter));
    match config.kind {
        ExecutorKind::Once => Arc::new(OnceExecutor::new(shared)),
        ExecutorKind::Prologue => Arc::new(PrologueExecutor::new(shared)),
        ExecutorKind::Epilogue => Arc::new(EpilogueExecutor::new(shared)),
        ExecutorKind::Always => Arc::new(AlwaysExecutor::new(shared)),
    }
}

/// State common to every variant.
pub(crate) struct ExecutorShared {
    pub(crate) context: Context,
    pub(crate) config: Arc<ExecutorConfig>,
    pub(crate) name: String,
    pub(crate) emitter: Emitter,
    room_name: String,
    volume: Mutex<Option<String>>,
}

impl ExecutorShared {
    fn new(
        context: Context,
        config: Arc<ExecutorConfig>,
        room_name: &str,
        name: &str,
        emitter: Emitter,
    ) -> Self {
        Self {
            context,
            config,
            name: name.to_string(),
            emitter,
            room_name: room_name.to_string(),
            volume: Mutex::new(None),
        }
    }

    pub(crate) fn bind_volume(&self, volume: &str) {
        *self.volume.lock() = Some(volume.to_string());
    }

    pub(crate) fn clear_volume(&self) {
        *self.volume.lock() = None;
    }

    pub(crate) fn volume(&self) -> Result<String, ExecutorError> {
        self.volume.lock().clone().ok_or(ExecutorError::NotInstantiated)
    }

    /// Deterministic name of this executor's container.
    pub(crate) fn container_name(&self) -> String {
        parlor_core::container_name(&self.room_name, &self.name)
    }
}

/// Error text with its source chain, for `errored` payloads.
pub(crate) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
