/// Wire protocol for the realtime channel. Clients send commands, the
/// server answers with events; both sides carry a `type` discriminator.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::registry::ConnectionId;
use super::rooms::RoomId;
use crate::error::AppError;
use crate::models::Notification;

/// Commands a connected client may issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a room; refused when the credential lacks the entitlement
    JoinRoom { room: String },

    /// Leave a room; a no-op when not a member
    LeaveRoom { room: String },

    /// Publish a message to a joined room
    SendMessage { room: String, text: String },

    /// Fetch unread notifications, newest first
    ListUnread,

    /// Mark one owned notification as read
    MarkRead { id: Uuid },

    /// Mark every unread notification as read
    MarkAllRead,
}

impl ClientEvent {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Events pushed from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Handshake acknowledgment with the catch-up unread count
    Connected {
        connection_id: ConnectionId,
        unread_count: i64,
        timestamp: i64,
    },

    RoomJoined { room: String },

    RoomLeft { room: String },

    /// Message published to a room the connection is a member of
    RoomMessage {
        room: String,
        sender_id: Uuid,
        sender_name: String,
        text: String,
        sent_at: DateTime<Utc>,
    },

    /// Toast push for a freshly created notification
    Notification { notification: Notification },

    /// Unread badge value, always derived from the store
    UnreadCount { count: i64 },

    UnreadList { notifications: Vec<Notification> },

    MarkedRead { id: Uuid },

    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn connected(connection_id: ConnectionId, unread_count: i64) -> Self {
        ServerEvent::Connected {
            connection_id,
            unread_count,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn room_joined(room: &RoomId) -> Self {
        ServerEvent::RoomJoined {
            room: room.to_string(),
        }
    }

    pub fn room_left(room: &RoomId) -> Self {
        ServerEvent::RoomLeft {
            room: room.to_string(),
        }
    }

    pub fn room_message(room: &RoomId, sender_id: Uuid, sender_name: &str, text: String) -> Self {
        ServerEvent::RoomMessage {
            room: room.to_string(),
            sender_id,
            sender_name: sender_name.to_string(),
            text,
            sent_at: Utc::now(),
        }
    }

    pub fn notification(notification: Notification) -> Self {
        ServerEvent::Notification { notification }
    }

    pub fn unread_count(count: i64) -> Self {
        ServerEvent::UnreadCount { count }
    }

    pub fn unread_list(notifications: Vec<Notification>) -> Self {
        ServerEvent::UnreadList { notifications }
    }

    pub fn marked_read(id: Uuid) -> Self {
        ServerEvent::MarkedRead { id }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn from_app_error(err: &AppError) -> Self {
        ServerEvent::error(err.code(), err.to_string())
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
