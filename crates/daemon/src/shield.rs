// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation-resistant execution for cleanup paths.
//!
//! Tasks are cancelled by aborting them, which can interrupt a future at
//! any await point. A cancel landing in the middle of a revert or a
//! stop+delete would leak containers or volumes, so every such region runs
//! through [`shield`]: the work executes on a detached task that an abort
//! of the waiter cannot touch. The waiter observes its cancellation only
//! once the inner work has completed.

use std::future::Future;

/// Run `future` to completion on a detached task, immune to cancellation
/// of the caller.
pub async fn shield<F>(future: F) -> F::Output
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let task = tokio::spawn(future);
    match task.await {
        Ok(value) => value,
        Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
        Err(_) => unreachable!("shielded task is never aborted"),
    }
}

#[cfg(test)]
#[path = "shield_tests.rs"]
mod tests;
