//! WebSocket session lifecycle — one authenticated client from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use parley_core::{ConnectionId, ServerEvent, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::handle_message;
use super::presence::PresenceRegistry;
use super::rooms::RoomCoordinator;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_ONLINE_USERS,
};

/// Tunables the session inherits from the server config.
#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    /// Interval between server-initiated ping frames.
    pub ping_interval: Duration,
    /// Disconnect after this long without a pong.
    pub pong_timeout: Duration,
    /// Outbound queue capacity per connection.
    pub send_queue_capacity: usize,
}

/// Run a WebSocket session for an already-authenticated client.
///
/// 1. Registers the connection in the presence registry
/// 2. Sends a `connection.established` greeting
/// 3. Applies inbound join/leave frames through the coordinator
/// 4. Forwards queued outbound events, pinging on an interval
/// 5. Tears down idempotently on close, error, or shutdown
#[allow(clippy::cast_precision_loss)]
#[instrument(skip_all, fields(user = %user_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    user_id: UserId,
    presence: Arc<PresenceRegistry>,
    coordinator: Arc<RoomCoordinator>,
    settings: SessionSettings,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(settings.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(ConnectionId::new(), user_id, send_tx));
    let connection_id = connection.id.clone();

    info!(conn = %connection_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    presence.add(Arc::clone(&connection));
    gauge!(WS_ONLINE_USERS).set(presence.online_count() as f64);

    let greeting = ServerEvent::connection_established(connection_id.as_str());
    if let Ok(json) = serde_json::to_string(&greeting) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder: queued events plus periodic pings. Exiting for
    // any reason cancels the session token so the inbound loop unblocks
    // even when the peer is half-open and never sends another frame.
    let session_cancel = cancel.child_token();
    let outbound_conn = Arc::clone(&connection);
    let outbound_cancel = session_cancel.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(settings.ping_interval);
        // Skip the immediate first tick.
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > settings.pong_timeout
                    {
                        warn!("client unresponsive for {:?}, disconnecting", settings.pong_timeout);
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        outbound_cancel.cancel();
    });

    // Inbound loop.
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = session_cancel.cancelled() => break,
        };
        let Some(Ok(msg)) = msg else { break };

        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    debug!(len = data.len(), "non-UTF8 binary frame ignored");
                    None
                }
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };
        connection.mark_alive();

        if let Some(ack) = handle_message(&text, &connection, &coordinator).await {
            if !connection.send(Arc::new(ack)) {
                debug!("failed to enqueue ack (channel full or closed)");
            }
        }
    }

    // Teardown: both cleanups run unconditionally and are idempotent.
    info!(conn = %connection_id, "client disconnected");
    coordinator.leave(&connection);
    presence.remove(user_id, &connection_id);

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    gauge!(WS_ONLINE_USERS).set(presence.online_count() as f64);
    outbound.abort();
}

#[cfg(test)]
mod tests {
    // Full session behavior needs a live WebSocket pair and is exercised by
    // the router tests in `server.rs`; the pieces the session composes
    // (presence, coordinator, handler, connection) each carry their own
    // unit tests.

    use super::*;

    #[test]
    fn settings_are_plain_data() {
        let settings = SessionSettings {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(90),
            send_queue_capacity: 256,
        };
        let copy = settings;
        assert_eq!(copy.ping_interval, Duration::from_secs(30));
        assert_eq!(copy.send_queue_capacity, 256);
    }

    #[test]
    fn greeting_shape() {
        let event = ServerEvent::connection_established("conn_9");
        let json = serde_json::to_string(&event).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "connection.established");
        assert_eq!(parsed["data"]["connectionId"], "conn_9");
    }
}
