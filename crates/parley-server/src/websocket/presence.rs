//! Online-user tracking.
//!
//! Process-wide map from user ID to that user's open connections. A user
//! appears here iff they have at least one live connection; the entry is
//! removed the instant the last one closes. Backed by `DashMap`, so
//! operations on different users never contend and operations on the same
//! user serialize on the shard lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_core::{ConnectionId, UserId};
use tracing::debug;

use super::connection::ClientConnection;

/// Registry of every user with at least one open connection.
pub struct PresenceRegistry {
    users: DashMap<UserId, Vec<Arc<ClientConnection>>>,
    /// Total open connections (avoids walking the map for counts).
    connection_count: AtomicUsize,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            connection_count: AtomicUsize::new(0),
        }
    }

    /// Record a newly opened connection for `user`.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let user = connection.user_id;
        self.users.entry(user).or_default().push(connection);
        let _ = self.connection_count.fetch_add(1, Ordering::Relaxed);
        debug!(%user, "presence added");
    }

    /// Remove exactly this connection from `user`'s entry.
    ///
    /// Idempotent: removing an already-absent connection is a no-op. When
    /// the entry empties it is deleted in the same shard-locked step.
    pub fn remove(&self, user: UserId, connection_id: &ConnectionId) {
        if let Entry::Occupied(mut entry) = self.users.entry(user) {
            let conns = entry.get_mut();
            let before = conns.len();
            conns.retain(|c| c.id != *connection_id);
            if conns.len() < before {
                let _ = self.connection_count.fetch_sub(1, Ordering::Relaxed);
                debug!(%user, "presence removed");
            }
            if conns.is_empty() {
                let _ = entry.remove();
            }
        }
    }

    /// Snapshot of `user`'s open connections (possibly empty).
    pub fn connections_for(&self, user: UserId) -> Vec<Arc<ClientConnection>> {
        self.users
            .get(&user)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Whether `user` has at least one open connection.
    pub fn is_online(&self, user: UserId) -> bool {
        self.users.contains_key(&user)
    }

    /// Number of distinct online users.
    pub fn online_count(&self) -> usize {
        self.users.len()
    }

    /// Number of open connections across all users.
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
