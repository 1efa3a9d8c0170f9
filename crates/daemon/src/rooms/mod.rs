// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room lifecycle core.
//!
//! A room owns one data volume and a fixed set of executors, shared by all
//! sessions attached under the same name. Attach/detach are synchronous
//! membership edits; [`Room::update`] is the single place that may
//! instantiate or tear down, serialized by a per-room lock and safe to
//! re-invoke after any membership change. "First in instantiates, last out
//! tears down" falls out of that convergence step.

mod connection;

pub use connection::{RoomConnection, RoomRegistry};

use std::sync::Arc;

use futures_util::future::join_all;
use indexmap::IndexMap;
use parlor_adapters::{BackendError, Context};
use parlor_core::config::PageConfig;
use parlor_core::protocol::Inbound;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::executors::{self, Executor, ExecutorError};
use crate::session::{Emitter, SessionHandle, Sessions};

/// Errors from room operations.
#[derive(Debug, Error)]
pub enum RoomError {
    /// A message named an executor this room does not have.
    #[error("unknown executor {0:?}")]
    UnknownExecutor(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// At least one executor failed to tear down; the volume was still
    /// deleted and the room left the instantiated state.
    #[error("tear down incomplete: {0}")]
    TearDownIncomplete(String),
}

/// Lifecycle state guarded by the update lock.
#[derive(Default)]
struct Lifecycle {
    instantiated: bool,
    volume: Option<String>,
}

pub struct Room {
    name: String,
    context: Context,
    sessions: Arc<Sessions>,
    /// Fixed at construction from configuration; never mutated.
    executors: IndexMap<String, Arc<dyn Executor>>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl Room {
    pub fn new(context: &Context, config: &PageConfig, name: &str) -> Arc<Self> {
        let sessions = Arc::new(Sessions::default());
        let executors = config
            .executors
            .iter()
            .map(|(executor_name, executor_config)| {
                let emitter = Emitter::new(executor_name.clone(), Arc::clone(&sessions));
                let executor = executors::build(
                    context,
                    Arc::new(executor_config.clone()),
                    name,
                    executor_name,
                    emitter,
                );
                (executor_name.clone(), executor)
            })
            .collect();
        Arc::new(Self {
            name: name.to_string(),
            context: context.clone(),
            sessions,
            executors,
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attach_session(&self, session: SessionHandle) {
        debug!(room = %self.name, session_id = session.id(), "attaching session");
        self.sessions.attach(session);
    }

    pub fn detach_session(&self, id: u64) {
        debug!(room = %self.name, session_id = id, "detaching session");
        self.sessions.detach(id);
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub async fn is_instantiated(&self) -> bool {
        self.lifecycle.lock().await.instantiated
    }

    /// Route a session payload to the named executor.
    pub async fn handle_message(&self, inbound: Inbound) -> Result<(), RoomError> {
        let executor = self
            .executors
            .get(&inbound.executor)
            .ok_or_else(|| RoomError::UnknownExecutor(inbound.executor.clone()))?;
        executor.handle_message(inbound.message).await?;
        Ok(())
    }

    /// Converge the sandbox to the attached-session count.
    ///
    /// The only instantiate/tear-down site. Serialized per room, idempotent,
    /// safe to call after every attach or detach.
    pub async fn update(&self) -> Result<(), RoomError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !self.sessions.is_empty() && !lifecycle.instantiated {
            info!(room = %self.name, "first session attached, instantiating");
            match self.instantiate(&mut lifecycle).await {
                Ok(()) => Ok(()),
                Err(error) => {
                    if let Err(cleanup_error) = self.tear_down(&mut lifecycle).await {
                        warn!(
                            room = %self.name,
                            error = %cleanup_error,
                            "clean-up after failed instantiation left residue"
                        );
                    }
                    Err(error)
                }
            }
        } else if self.sessions.is_empty() && lifecycle.instantiated {
            info!(room = %self.name, "last session detached, tearing down");
            let result = self.tear_down(&mut lifecycle).await;
            // A failed tear-down still leaves the instantiated state.
            lifecycle.instantiated = false;
            result
        } else {
            Ok(())
        }
    }

    /// Create the volume, then instantiate every executor in declared order.
    async fn instantiate(&self, lifecycle: &mut Lifecycle) -> Result<(), RoomError> {
        let volume = parlor_core::volume_name(&self.name);
        self.context.backend().create_volume(&volume).await?;
        lifecycle.volume = Some(volume.clone());
        for (executor_name, executor) in &self.executors {
            debug!(room = %self.name, executor = %executor_name, "instantiating executor");
            executor.instantiate(&volume).await?;
        }
        lifecycle.instantiated = true;
        info!(room = %self.name, "instantiated");
        Ok(())
    }

    /// Tear every executor down concurrently, collecting failures, then
    /// delete the volume regardless. Idempotent over absent sub-resources.
    async fn tear_down(&self, lifecycle: &mut Lifecycle) -> Result<(), RoomError> {
        let results = join_all(self.executors.iter().map(|(executor_name, executor)| async move {
            debug!(room = %self.name, executor = %executor_name, "tearing down executor");
            (executor_name, executor.tear_down().await)
        }))
        .await;

        let mut failures = Vec::new();
        for (executor_name, result) in results {
            if let Err(error) = result {
                warn!(
                    room = %self.name,
                    executor = %executor_name,
                    error = %error,
                    "executor tear down failed"
                );
                failures.push(format!("{executor_name}: {error}"));
            }
        }

        if let Some(volume) = lifecycle.volume.take() {
            match self.context.backend().delete_volume(&volume).await {
                Ok(()) => {}
                Err(error) if error.is_not_found() => {}
                Err(error) => {
                    warn!(room = %self.name, error = %error, "volume deletion failed");
                    failures.push(format!("volume: {error}"));
                }
            }
        }

        if failures.is_empty() {
            info!(room = %self.name, "torn down");
            Ok(())
        } else {
            Err(RoomError::TearDownIncomplete(failures.join("; ")))
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
