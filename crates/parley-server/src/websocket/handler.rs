//! Inbound frame dispatch — parses client text frames and applies
//! join/leave requests through the room coordinator.

use std::sync::Arc;

use parley_core::{ClientRequest, JoinAck};
use tracing::{debug, instrument, warn};

use super::connection::ClientConnection;
use super::rooms::{JoinError, RoomCoordinator};

/// Denial message for a join the directory refused. Covers both
/// non-membership and a nonexistent room; the client cannot tell which.
const DENIED_MESSAGE: &str = "Chatroom not found";

/// Failure message when the membership store could not be asked at all.
const UNAVAILABLE_MESSAGE: &str = "Chat service temporarily unavailable";

/// Handle one inbound text frame.
///
/// Returns the serialized acknowledgement to send back, if the request
/// calls for one. Unparseable frames are logged and dropped; the
/// connection stays up.
#[instrument(skip_all, fields(conn = %connection.id))]
pub async fn handle_message(
    text: &str,
    connection: &Arc<ClientConnection>,
    coordinator: &RoomCoordinator,
) -> Option<String> {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "unparseable frame dropped");
            return None;
        }
    };

    match request {
        ClientRequest::JoinRoom { id, room_id } => {
            let ack = match coordinator.join(connection, room_id).await {
                Ok(()) => JoinAck::ok(id),
                Err(JoinError::Denied) => JoinAck::denied(id, DENIED_MESSAGE),
                Err(JoinError::Directory(e)) => {
                    warn!(room = %room_id, error = %e, "join failed on membership check");
                    JoinAck::denied(id, UNAVAILABLE_MESSAGE)
                }
            };
            match serde_json::to_string(&ack) {
                Ok(json) => Some(json),
                Err(e) => {
                    warn!(error = %e, "failed to serialize ack");
                    None
                }
            }
        }
        ClientRequest::LeaveRoom => {
            coordinator.leave(connection);
            debug!("left room on request");
            None
        }
    }
}
