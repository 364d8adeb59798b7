//! Best-effort fan-out to live connections.

use std::sync::Arc;

use metrics::counter;
use parley_core::{RoomId, ServerEvent, UserId};
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::presence::PresenceRegistry;
use super::rooms::RoomRegistry;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Delivers payloads to the right set of live connections.
///
/// Both operations are fire-and-forget for the caller: the CRUD layer
/// invokes them after its own database write has committed and never
/// waits for delivery. A connection that closes mid-delivery simply
/// misses the payload.
pub struct BroadcastDispatcher {
    rooms: Arc<RoomRegistry>,
    presence: Arc<PresenceRegistry>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher over the shared registries.
    pub fn new(rooms: Arc<RoomRegistry>, presence: Arc<PresenceRegistry>) -> Self {
        Self { rooms, presence }
    }

    /// Deliver `event` to every connection subscribed to `room` at the
    /// moment of the call — a snapshot, not a lock over future changes.
    pub fn broadcast_to_room(&self, room: RoomId, event: &ServerEvent) {
        let subscribers = self.rooms.subscribers(room);
        self.deliver(&subscribers, event, "room");
        debug!(%room, recipients = subscribers.len(), "room broadcast");
    }

    /// Deliver `event` to every open connection of `user`, regardless of
    /// room. Used for out-of-room notifications.
    pub fn notify_user(&self, user: UserId, event: &ServerEvent) {
        let connections = self.presence.connections_for(user);
        self.deliver(&connections, event, "user");
        debug!(%user, recipients = connections.len(), "user notification");
    }

    /// Serialize once and push to each connection; per-connection failures
    /// never abort delivery to the rest and are not surfaced to the caller.
    fn deliver(&self, connections: &[Arc<ClientConnection>], event: &ServerEvent, label: &str) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                return;
            }
        };
        for conn in connections {
            if !conn.send(Arc::clone(&json)) {
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    conn = %conn.id,
                    label,
                    total_drops = conn.drop_count(),
                    "failed to deliver event (channel full or closed)"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::MockRoomDirectory;
    use crate::websocket::rooms::RoomCoordinator;
    use parley_core::ConnectionId;
    use tokio::sync::mpsc;

    struct Fixture {
        presence: Arc<PresenceRegistry>,
        coordinator: RoomCoordinator,
        dispatcher: BroadcastDispatcher,
    }

    fn fixture() -> Fixture {
        let rooms = Arc::new(RoomRegistry::new());
        let presence = Arc::new(PresenceRegistry::new());
        let mut dir = MockRoomDirectory::new();
        let _ = dir.expect_is_member().returning(|_, _| Ok(true));
        Fixture {
            presence: Arc::clone(&presence),
            coordinator: RoomCoordinator::new(Arc::clone(&rooms), Arc::new(dir)),
            dispatcher: BroadcastDispatcher::new(rooms, presence),
        }
    }

    fn make_connection(
        id: &str,
        user: i64,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(
            ConnectionId::from(id),
            UserId::new(user),
            tx,
        ));
        (conn, rx)
    }

    fn chat(room: i64, text: &str) -> ServerEvent {
        ServerEvent::chat_message(RoomId::new(room), serde_json::json!({ "text": text }))
    }

    #[tokio::test]
    async fn room_broadcast_reaches_all_subscribers() {
        let fx = fixture();
        let (c1, mut rx1) = make_connection("c1", 1);
        let (c2, mut rx2) = make_connection("c2", 2);
        fx.coordinator.join(&c1, RoomId::new(7)).await.unwrap();
        fx.coordinator.join(&c2, RoomId::new(7)).await.unwrap();

        fx.dispatcher.broadcast_to_room(RoomId::new(7), &chat(7, "hi"));

        let msg1: serde_json::Value = serde_json::from_str(&rx1.try_recv().unwrap()).unwrap();
        assert_eq!(msg1["data"]["text"], "hi");
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_skips_other_rooms_and_unjoined() {
        let fx = fixture();
        let (member, mut member_rx) = make_connection("c1", 1);
        let (elsewhere, mut elsewhere_rx) = make_connection("c2", 2);
        let (unjoined, mut unjoined_rx) = make_connection("c3", 3);
        fx.coordinator.join(&member, RoomId::new(7)).await.unwrap();
        fx.coordinator.join(&elsewhere, RoomId::new(8)).await.unwrap();
        fx.presence.add(Arc::clone(&unjoined));

        fx.dispatcher.broadcast_to_room(RoomId::new(7), &chat(7, "hi"));

        assert!(member_rx.try_recv().is_ok());
        assert!(elsewhere_rx.try_recv().is_err());
        assert!(unjoined_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_empty_room_is_noop() {
        let fx = fixture();
        // Must not panic or error.
        fx.dispatcher.broadcast_to_room(RoomId::new(99), &chat(99, "void"));
    }

    #[tokio::test]
    async fn notify_user_reaches_all_devices_regardless_of_room() {
        let fx = fixture();
        let (phone, mut phone_rx) = make_connection("phone", 1);
        let (laptop, mut laptop_rx) = make_connection("laptop", 1);
        let (other, mut other_rx) = make_connection("other", 2);
        fx.presence.add(Arc::clone(&phone));
        fx.presence.add(Arc::clone(&laptop));
        fx.presence.add(Arc::clone(&other));
        // One device is in a room, the other is not.
        fx.coordinator.join(&phone, RoomId::new(7)).await.unwrap();

        let event = ServerEvent::notification(serde_json::json!({ "kind": "room.added" }));
        fx.dispatcher.notify_user(UserId::new(1), &event);

        assert!(phone_rx.try_recv().is_ok());
        assert!(laptop_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notify_offline_user_is_noop() {
        let fx = fixture();
        let event = ServerEvent::notification(serde_json::json!({}));
        fx.dispatcher.notify_user(UserId::new(404), &event);
    }

    #[tokio::test]
    async fn closed_connection_does_not_abort_fanout() {
        let fx = fixture();
        let (dead, dead_rx) = make_connection("dead", 1);
        let (live, mut live_rx) = make_connection("live", 2);
        fx.coordinator.join(&dead, RoomId::new(7)).await.unwrap();
        fx.coordinator.join(&live, RoomId::new(7)).await.unwrap();
        drop(dead_rx);

        fx.dispatcher.broadcast_to_room(RoomId::new(7), &chat(7, "hi"));

        assert!(live_rx.try_recv().is_ok());
        assert_eq!(dead.drop_count(), 1);
    }

    #[tokio::test]
    async fn full_channel_drops_silently() {
        let fx = fixture();
        let (tx, _rx) = mpsc::channel(1);
        let slow = Arc::new(ClientConnection::new(
            ConnectionId::from("slow"),
            UserId::new(1),
            tx,
        ));
        fx.coordinator.join(&slow, RoomId::new(7)).await.unwrap();

        fx.dispatcher.broadcast_to_room(RoomId::new(7), &chat(7, "a"));
        fx.dispatcher.broadcast_to_room(RoomId::new(7), &chat(7, "b"));

        // First fills the queue, second is dropped; neither errors.
        assert_eq!(slow.drop_count(), 1);
    }

    #[tokio::test]
    async fn recipients_share_one_serialization() {
        let fx = fixture();
        let (c1, mut rx1) = make_connection("c1", 1);
        let (c2, mut rx2) = make_connection("c2", 2);
        fx.coordinator.join(&c1, RoomId::new(7)).await.unwrap();
        fx.coordinator.join(&c2, RoomId::new(7)).await.unwrap();

        fx.dispatcher.broadcast_to_room(RoomId::new(7), &chat(7, "hi"));

        let m1 = rx1.recv().await.unwrap();
        let m2 = rx2.recv().await.unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));
    }

    #[tokio::test]
    async fn broadcast_after_move_reaches_new_room_only() {
        let fx = fixture();
        let (conn, mut rx) = make_connection("c1", 1);
        fx.coordinator.join(&conn, RoomId::new(1)).await.unwrap();
        fx.coordinator.join(&conn, RoomId::new(2)).await.unwrap();

        fx.dispatcher.broadcast_to_room(RoomId::new(1), &chat(1, "old"));
        assert!(rx.try_recv().is_err());

        fx.dispatcher.broadcast_to_room(RoomId::new(2), &chat(2, "new"));
        let msg: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["data"]["text"], "new");
    }
}
