// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot trigger executor.
//!
//! Any payload starts a background run that reports `started`, streams the
//! container's output, and ends with `finished` or `errored`. The run slot
//! is single-occupancy: a trigger arriving while a run is in flight is
//! ignored. The slot frees before the final status message goes out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use parlor_core::protocol;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{error_chain, runner, Executor, ExecutorError, ExecutorShared};

pub struct OnceExecutor {
    shared: Arc<ExecutorShared>,
    run: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl OnceExecutor {
    pub(crate) fn new(shared: Arc<ExecutorShared>) -> Self {
        Self { shared, run: Mutex::new(None), running: Arc::new(AtomicBool::new(false)) }
    }
}

#[async_trait]
impl Executor for OnceExecutor {
    async fn instantiate(&self, volume: &str) -> Result<(), ExecutorError> {
        self.shared.bind_volume(volume);
        Ok(())
    }

    async fn handle_message(&self, _message: Value) -> Result<(), ExecutorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!(executor = %self.shared.name, "run already in progress, ignoring trigger");
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        *self.run.lock() = Some(tokio::spawn(async move {
            shared.emitter.emit(protocol::started());
            let result = runner::run_once(&shared).await;
            running.store(false, Ordering::SeqCst);
            match result {
                Ok(()) => shared.emitter.emit(protocol::finished()),
                Err(error) => {
                    warn!(executor = %shared.name, error = %error, "run failed");
                    shared.emitter.emit(protocol::errored(&error_chain(&error)));
                }
            }
        }));
        Ok(())
    }

    async fn tear_down(&self) -> Result<(), ExecutorError> {
        let handle = self.run.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.running.store(false, Ordering::SeqCst);
        self.shared.clear_volume();
        Ok(())
    }
}

#[cfg(test)]
#[path = "once_tests.rs"]
mod tests;
