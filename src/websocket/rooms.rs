//! Room membership and message routing.
//!
//! Two room families exist: the shared public room every authenticated
//! connection may join, and one room per department gated by the
//! department entitlements carried in the credential. The router tracks
//! membership only; delivery goes through the connection registry, which
//! owns the outbound channels. Messages are fanned out under the router's
//! write lock, so all members of a room observe the same publish order.
//! Nothing is retained: a message is delivered to the members present at
//! publish time and then gone.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;
use uuid::Uuid;

use super::messages::ServerEvent;
use super::registry::{ConnectionId, ConnectionRegistry};
use crate::auth::Claims;
use crate::error::AppError;
use crate::metrics;

/// Identity of a joinable room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Org-wide room, open to every authenticated connection
    Public,
    /// Department room, requires the matching entitlement
    Department(Uuid),
}

impl RoomId {
    /// Room family label, bounded cardinality for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomId::Public => "public",
            RoomId::Department(_) => "department",
        }
    }

    /// Whether the given claims grant access to this room.
    pub fn authorized_for(&self, claims: &Claims) -> bool {
        match self {
            RoomId::Public => true,
            RoomId::Department(id) => claims.departments.contains(id),
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Public => write!(f, "public"),
            RoomId::Department(id) => write!(f, "department:{id}"),
        }
    }
}

impl FromStr for RoomId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "public" {
            return Ok(RoomId::Public);
        }
        if let Some(raw) = s.strip_prefix("department:") {
            let id = Uuid::parse_str(raw)
                .map_err(|_| AppError::BadRequest(format!("unknown room: {s}")))?;
            return Ok(RoomId::Department(id));
        }
        Err(AppError::BadRequest(format!("unknown room: {s}")))
    }
}

#[derive(Debug, Clone, Copy)]
struct RoomMember {
    subject: Uuid,
    connection_id: ConnectionId,
}

/// Routes room messages to current members.
///
/// Membership is keyed by connection, not subject: each tab or device
/// joins rooms on its own. Publishing and membership changes share one
/// write lock, so a publish never observes a half-updated member set and
/// every member sees the same total order per room. Members the registry
/// no longer knows are pruned during publish.
#[derive(Clone)]
pub struct RoomRouter {
    registry: ConnectionRegistry,
    rooms: Arc<RwLock<HashMap<RoomId, Vec<RoomMember>>>>,
}

impl RoomRouter {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a room after checking the credential's
    /// entitlement. Joining a room twice is a no-op.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        claims: &Claims,
        room: RoomId,
    ) -> Result<(), AppError> {
        if !room.authorized_for(claims) {
            return Err(AppError::RoomAccessDenied(room.to_string()));
        }

        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room).or_default();
        if members.iter().any(|m| m.connection_id == connection_id) {
            return Ok(());
        }
        members.push(RoomMember {
            subject: claims.sub,
            connection_id,
        });
        Ok(())
    }

    /// Remove a connection from a room. Leaving a room the connection
    /// never joined is a no-op.
    pub async fn leave(&self, room: &RoomId, connection_id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.retain(|m| m.connection_id != connection_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Remove a connection from every room it joined, in one pass.
    pub async fn leave_all(&self, connection_id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.retain(|m| m.connection_id != connection_id);
            !members.is_empty()
        });
    }

    /// Publish a message to a room on behalf of a member connection.
    ///
    /// The sender must currently be a member; the message is handed to the
    /// registry for every member, the sender included. Members whose
    /// connection is gone are pruned. Returns the number of connections
    /// the message was handed to.
    pub async fn publish(
        &self,
        room: &RoomId,
        sender_connection: ConnectionId,
        sender_id: Uuid,
        sender_name: &str,
        text: String,
    ) -> Result<usize, AppError> {
        let event = ServerEvent::room_message(room, sender_id, sender_name, text);
        let payload = event.to_json().map_err(|e| {
            error!("failed to serialize room message: {e}");
            AppError::Internal
        })?;

        let mut rooms = self.rooms.write().await;
        let members = rooms
            .get_mut(room)
            .ok_or_else(|| AppError::RoomAccessDenied(room.to_string()))?;
        if !members.iter().any(|m| m.connection_id == sender_connection) {
            return Err(AppError::RoomAccessDenied(room.to_string()));
        }

        let mut kept = Vec::with_capacity(members.len());
        for member in members.drain(..) {
            if self
                .registry
                .push_to_connection(member.subject, member.connection_id, &payload)
                .await
            {
                kept.push(member);
            }
        }
        let delivered = kept.len();
        *members = kept;
        if delivered == 0 {
            rooms.remove(room);
        }

        metrics::observe_room_message(room.kind());
        Ok(delivered)
    }

    pub async fn is_member(&self, room: &RoomId, connection_id: ConnectionId) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|members| members.iter().any(|m| m.connection_id == connection_id))
            .unwrap_or(false)
    }

    pub async fn member_count(&self, room: &RoomId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    /// Rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }

    pub async fn total_memberships(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.values().map(Vec::len).sum()
    }
}
