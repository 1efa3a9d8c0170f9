// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attached-session bookkeeping and fan-out.
//!
//! Each WebSocket session owns a bounded outbound queue drained by its
//! connection's writer task. Rooms hold only the senders; fan-out iterates
//! a point-in-time snapshot and never blocks on a slow receiver — a full
//! queue drops that message for that session.

use std::sync::Arc;

use parking_lot::Mutex;
use parlor_core::protocol::Outbound;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// Outbound queue capacity per session.
pub const SESSION_QUEUE_CAPACITY: usize = 64;

/// One attached session: an identifier plus its outbound queue.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    tx: mpsc::Sender<Outbound>,
}

impl SessionHandle {
    pub fn new(id: u64) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// The set of sessions attached to one room.
///
/// Membership edits are synchronous and never touch the backend.
#[derive(Default)]
pub struct Sessions {
    attached: Mutex<Vec<SessionHandle>>,
}

impl Sessions {
    pub fn attach(&self, session: SessionHandle) {
        self.attached.lock().push(session);
    }

    pub fn detach(&self, id: u64) {
        self.attached.lock().retain(|session| session.id != id);
    }

    pub fn is_empty(&self) -> bool {
        self.attached.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.attached.lock().len()
    }

    /// Deliver `message` to every currently attached session. Late joiners
    /// do not see it; early leavers receive nothing further.
    pub fn broadcast(&self, message: &Outbound) {
        let snapshot: Vec<SessionHandle> = self.attached.lock().clone();
        for session in snapshot {
            match session.tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        session_id = session.id,
                        executor = %message.executor,
                        "outbound queue full, dropping message"
                    );
                }
                // Writer task gone; the session is on its way out.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }
}

/// Tags one executor's payloads with its name and fans them out.
#[derive(Clone)]
pub struct Emitter {
    executor: String,
    sessions: Arc<Sessions>,
}

impl Emitter {
    pub fn new(executor: String, sessions: Arc<Sessions>) -> Self {
        Self { executor, sessions }
    }

    pub fn emit(&self, payload: Value) {
        self.sessions
            .broadcast(&Outbound { executor: self.executor.clone(), message: payload });
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
