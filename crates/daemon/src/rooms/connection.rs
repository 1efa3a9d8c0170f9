// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped binding of one session to a room.
//!
//! Attaching finds or creates the room and registers the session inside a
//! single registry critical region, then lets `update()` converge the
//! lifecycle. Detaching mirrors it — and always runs shielded, so a
//! cancellation arriving while a session unwinds can never leak a room, a
//! volume, or a container.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Room, RoomError};
use crate::session::SessionHandle;
use crate::shield::shield;
use parlor_adapters::Context;
use parlor_core::config::PageConfig;

/// The page-level room registry.
pub type RoomRegistry = Arc<Mutex<HashMap<String, Arc<Room>>>>;

/// A session's scoped attachment to a room. Obtain with
/// [`RoomConnection::attach`]; every path must end in
/// [`RoomConnection::detach`].
pub struct RoomConnection {
    registry: RoomRegistry,
    room: Arc<Room>,
    room_name: String,
    session_id: u64,
}

impl std::fmt::Debug for RoomConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomConnection")
            .field("room_name", &self.room_name)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl RoomConnection {
    /// Attach `session` to the named room, creating and registering the
    /// room first if needed, then drive the lifecycle. If instantiation
    /// fails the session is detached (shielded) before the error surfaces.
    pub async fn attach(
        registry: RoomRegistry,
        context: Context,
        config: Arc<PageConfig>,
        room_name: String,
        session: SessionHandle,
    ) -> Result<Self, RoomError> {
        let session_id = session.id();
        let room = {
            // Create-or-get and the session attach share one critical
            // region, so no interleaving can observe a registered room
            // without its first session.
            let mut rooms = registry.lock().await;
            let room = match rooms.get(&room_name) {
                Some(room) => {
                    debug!(room = %room_name, "using existing room");
                    Arc::clone(room)
                }
                None => {
                    debug!(room = %room_name, "creating room");
                    let room = Room::new(&context, &config, &room_name);
                    rooms.insert(room_name.clone(), Arc::clone(&room));
                    room
                }
            };
            room.attach_session(session);
            room
        };

        let connection = Self { registry, room, room_name, session_id };
        if let Err(error) = connection.room.update().await {
            connection.detach().await;
            return Err(error);
        }
        Ok(connection)
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Detach the session and converge the room; runs shielded.
    pub async fn detach(self) {
        let Self { registry, room, room_name, session_id } = self;
        shield(detach_path(registry, room, room_name, session_id)).await;
    }
}

async fn detach_path(registry: RoomRegistry, room: Arc<Room>, room_name: String, session_id: u64) {
    room.detach_session(session_id);
    if let Err(error) = room.update().await {
        warn!(room = %room_name, error = %error, "room update during detach failed");
    }
    // Registry removal happens even when the tear-down above failed: the
    // room has left the instantiated state either way. The identity check
    // keeps a late detach from evicting a successor room under the same name.
    let mut rooms = registry.lock().await;
    if room.is_empty()
        && rooms.get(&room_name).is_some_and(|registered| Arc::ptr_eq(registered, &room))
    {
        rooms.remove(&room_name);
        debug!(room = %room_name, "room removed from registry");
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
