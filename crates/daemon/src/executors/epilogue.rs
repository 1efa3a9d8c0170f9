// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finalization executor: runs its container to completion during room
//! tear-down, before the volume is destroyed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{runner, Executor, ExecutorError, ExecutorShared};

pub struct EpilogueExecutor {
    shared: Arc<ExecutorShared>,
}

impl EpilogueExecutor {
    pub(crate) fn new(shared: Arc<ExecutorShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl Executor for EpilogueExecutor {
    async fn instantiate(&self, volume: &str) -> Result<(), ExecutorError> {
        self.shared.bind_volume(volume);
        Ok(())
    }

    async fn handle_message(&self, _message: Value) -> Result<(), ExecutorError> {
        Err(ExecutorError::UnsupportedMessage)
    }

    async fn tear_down(&self) -> Result<(), ExecutorError> {
        // Nothing to finalize if the room never finished instantiating.
        if self.shared.volume().is_err() {
            return Ok(());
        }
        let result = runner::run_once(&self.shared).await;
        self.shared.clear_volume();
        result
    }
}
