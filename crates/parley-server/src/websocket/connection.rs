//! Per-connection state record.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_core::{ConnectionId, RoomId, UserId};
use tokio::sync::mpsc;

/// One live WebSocket session.
///
/// The owning user is fixed at authentication time and never changes. The
/// current room is the only mutable identity state; it is guarded by a
/// mutex so join/leave transitions for this connection serialize. The
/// record is owned by its session task and shared by `Arc` into the
/// presence registry and its room's subscriber set.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Authenticated owner, set exactly once.
    pub user_id: UserId,
    /// Room this connection is currently subscribed to, if any.
    room: Mutex<Option<RoomId>>,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    pub is_alive: AtomicBool,
    /// When the last pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection record for an authenticated user.
    pub fn new(id: ConnectionId, user_id: UserId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id,
            room: Mutex::new(None),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// The room this connection is subscribed to right now.
    pub fn room(&self) -> Option<RoomId> {
        *self.room.lock()
    }

    /// Lock the room slot for the duration of a join/leave transition.
    ///
    /// Only the room coordinator takes this guard; holding it serializes
    /// transitions for this connection.
    pub(crate) fn room_guard(&self) -> parking_lot::MutexGuard<'_, Option<RoomId>> {
        self.room.lock()
    }

    /// Send a text message to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter. Delivery is best-effort by contract.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for the heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}
