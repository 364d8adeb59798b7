//! Room subscription state and the join/leave coordinator.
//!
//! Authoritative membership lives in the CRUD layer's database; this module
//! only mirrors an already-authorized membership into a live subscriber set.
//! A connection belongs to at most one room at any observable instant:
//! transitions remove it from the old room's set before inserting it into
//! the new one, under the connection's room lock.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::counter;
use parley_core::{ConnectionId, RoomId};
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::membership::{DirectoryError, RoomDirectory};
use crate::metrics::{ROOM_JOINS_DENIED_TOTAL, ROOM_JOINS_TOTAL};

/// Why a join did not take effect.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// The user is not an authorized member, or the room does not exist.
    /// The two are deliberately indistinguishable to the client.
    #[error("not a member of room")]
    Denied,

    /// The authorization check itself failed. The connection's state is
    /// unchanged; retry policy belongs to the caller.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Live subscriber sets, one per room with at least one subscriber.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Vec<Arc<ClientConnection>>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Snapshot of the connections subscribed to `room` (possibly empty).
    pub fn subscribers(&self, room: RoomId) -> Vec<Arc<ClientConnection>> {
        self.rooms
            .get(&room)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Number of rooms with at least one live subscriber.
    pub fn active_room_count(&self) -> usize {
        self.rooms.len()
    }

    fn insert(&self, room: RoomId, connection: Arc<ClientConnection>) {
        let mut entry = self.rooms.entry(room).or_default();
        if !entry.iter().any(|c| c.id == connection.id) {
            entry.push(connection);
        }
    }

    fn remove(&self, room: RoomId, connection_id: &ConnectionId) {
        if let Entry::Occupied(mut entry) = self.rooms.entry(room) {
            entry.get_mut().retain(|c| c.id != *connection_id);
            if entry.get().is_empty() {
                let _ = entry.remove();
            }
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Mediates join/leave against the authoritative membership store.
pub struct RoomCoordinator {
    rooms: Arc<RoomRegistry>,
    directory: Arc<dyn RoomDirectory>,
}

impl RoomCoordinator {
    /// Create a coordinator over `rooms`, authorizing against `directory`.
    pub fn new(rooms: Arc<RoomRegistry>, directory: Arc<dyn RoomDirectory>) -> Self {
        Self { rooms, directory }
    }

    /// Subscribe `connection` to `room`.
    ///
    /// The directory check is awaited with no lock held; the in-memory
    /// transition afterwards runs under the connection's room lock. If the
    /// connection was in another room it leaves it first, so the broadcast
    /// dispatcher can never observe dual membership.
    ///
    /// Membership may change in the store after a successful join; the
    /// subscription is not re-checked per broadcast. A user removed from a
    /// room keeps receiving its messages until they rejoin or disconnect —
    /// accepted best-effort behavior.
    pub async fn join(
        &self,
        connection: &Arc<ClientConnection>,
        room: RoomId,
    ) -> Result<(), JoinError> {
        match self
            .directory
            .is_member(connection.user_id, room)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                counter!(ROOM_JOINS_DENIED_TOTAL).increment(1);
                debug!(user = %connection.user_id, %room, "join denied");
                return Err(JoinError::Denied);
            }
            Err(e) => {
                warn!(user = %connection.user_id, %room, error = %e, "membership check failed");
                return Err(JoinError::Directory(e));
            }
        }

        let mut current = connection.room_guard();
        if *current == Some(room) {
            // Rejoining the current room is a no-op.
            return Ok(());
        }
        if let Some(old) = current.take() {
            self.rooms.remove(old, &connection.id);
        }
        self.rooms.insert(room, Arc::clone(connection));
        *current = Some(room);
        drop(current);

        counter!(ROOM_JOINS_TOTAL).increment(1);
        debug!(conn = %connection.id, %room, "joined room");
        Ok(())
    }

    /// Unsubscribe `connection` from its current room, if any.
    ///
    /// Idempotent; called on explicit leave and unconditionally on
    /// disconnect teardown.
    pub fn leave(&self, connection: &Arc<ClientConnection>) {
        let mut current = connection.room_guard();
        if let Some(room) = current.take() {
            self.rooms.remove(room, &connection.id);
            debug!(conn = %connection.id, %room, "left room");
        }
    }

    /// Shared view of the subscriber sets, for the dispatcher.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }
}
