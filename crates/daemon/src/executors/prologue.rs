// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Setup executor: runs its container to completion during room
//! instantiation, before any session interaction.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{runner, Executor, ExecutorError, ExecutorShared};

pub struct PrologueExecutor {
    shared: Arc<ExecutorShared>,
}

impl PrologueExecutor {
    pub(crate) fn new(shared: Arc<ExecutorShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl Executor for PrologueExecutor {
    async fn instantiate(&self, volume: &str) -> Result<(), ExecutorError> {
        self.shared.bind_volume(volume);
        runner::run_once(&self.shared).await
    }

    async fn handle_message(&self, _message: Value) -> Result<(), ExecutorError> {
        Err(ExecutorError::UnsupportedMessage)
    }

    async fn tear_down(&self) -> Result<(), ExecutorError> {
        self.shared.clear_volume();
        Ok(())
    }
}
