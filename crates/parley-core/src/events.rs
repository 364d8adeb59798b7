//! Wire-format types for the client-facing real-time protocol.
//!
//! All frames are JSON text. Inbound frames are tagged by `type`
//! (`room.join`, `room.leave`); outbound frames are either a
//! [`JoinAck`] (`room.join.ack`) or a [`ServerEvent`] envelope
//! (`chat.message`, `notification`, `connection.established`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RoomId;

/// Incoming request from a connected client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// Ask to subscribe this connection to a room. Acknowledged with a
    /// [`JoinAck`] echoing `id`.
    #[serde(rename = "room.join", rename_all = "camelCase")]
    JoinRoom {
        /// Client-chosen request identifier, echoed in the ack.
        id: String,
        /// Room to join.
        room_id: RoomId,
    },

    /// Leave the current room, if any. Not acknowledged.
    #[serde(rename = "room.leave")]
    LeaveRoom,
}

/// Acknowledgement for a `room.join` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename = "room.join.ack")]
pub struct JoinAck {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the join succeeded.
    pub success: bool,
    /// Failure description (present when `success == false`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JoinAck {
    /// Build a success ack.
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            message: None,
        }
    }

    /// Build a failure ack.
    pub fn denied(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Server-pushed event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    /// Event type (`chat.message`, `notification`, `connection.established`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Room the event belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// Event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ServerEvent {
    /// Create an event with the current UTC timestamp.
    pub fn new(event_type: impl Into<String>, room_id: Option<RoomId>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            room_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    /// A chat message created in `room_id`. The payload is the
    /// already-persisted message as the CRUD layer committed it.
    pub fn chat_message(room_id: RoomId, payload: Value) -> Self {
        Self::new("chat.message", Some(room_id), Some(payload))
    }

    /// An out-of-room notification for a single user.
    pub fn notification(payload: Value) -> Self {
        Self::new("notification", None, Some(payload))
    }

    /// Greeting sent once right after a successful upgrade.
    pub fn connection_established(connection_id: &str) -> Self {
        Self::new(
            "connection.established",
            None,
            Some(serde_json::json!({ "connectionId": connection_id })),
        )
    }
}
