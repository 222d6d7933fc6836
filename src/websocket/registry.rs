//! Connection registry
//!
//! Tracks every live WebSocket connection keyed by authenticated subject.
//! A subject may hold several concurrent connections (multiple tabs or
//! devices); each is addressed individually by its [`ConnectionId`].
//!
//! The registry owns the sender half of every outbound channel. Dropping
//! a connection's entry closes its channel, which the session observes as
//! its signal to terminate the transport. Nothing else holds a sender, so
//! forced invalidation takes effect as soon as the entry is removed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::metrics;

/// Sender half of a connection's outbound channel. Payloads are
/// pre-serialized server events, one serialization per fanout.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// Opaque per-connection identity, distinct from the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Connection lifecycle after the handshake. Connecting never reaches the
/// registry (failed handshakes leave no record) and Closed is removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Credential accepted, no room joined yet
    Authenticated,
    /// Joined at least one room
    Active,
}

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    sender: OutboundSender,
}

/// Thread-safe registry of active connections.
///
/// Clones share the same underlying map, so handlers, sessions and the
/// notification fanout all observe one view of who is connected.
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, Vec<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a freshly authenticated connection.
    ///
    /// Returns a tuple of (connection_id, receiver) where:
    /// - connection_id: identity for this connection (used for cleanup)
    /// - receiver: channel the session forwards to the transport
    pub async fn register(&self, subject: Uuid) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        let mut connections = self.connections.write().await;
        connections.entry(subject).or_default().push(Connection {
            id,
            state: ConnectionState::Authenticated,
            sender: tx,
        });
        metrics::set_ws_connections(total_of(&connections));
        (id, rx)
    }

    /// Remove a single connection; other connections of the same subject
    /// are untouched.
    pub async fn unregister(&self, subject: Uuid, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(entries) = connections.get_mut(&subject) {
            entries.retain(|c| c.id != connection_id);
            if entries.is_empty() {
                connections.remove(&subject);
            }
        }
        metrics::set_ws_connections(total_of(&connections));
    }

    /// Promote a connection to Active once it has joined its first room.
    pub async fn mark_active(&self, subject: Uuid, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections
            .get_mut(&subject)
            .and_then(|entries| entries.iter_mut().find(|c| c.id == connection_id))
        {
            conn.state = ConnectionState::Active;
        }
    }

    /// Deliver a pre-serialized event to every connection of `subject`.
    ///
    /// Best effort: senders whose receiving session is gone are pruned
    /// instead of reported. Returns how many connections accepted the
    /// payload; zero when the subject is offline.
    pub async fn push_to_subject(&self, subject: Uuid, payload: &str) -> usize {
        let mut connections = self.connections.write().await;
        let delivered = match connections.get_mut(&subject) {
            Some(entries) => {
                entries.retain(|c| c.sender.send(payload.to_string()).is_ok());
                entries.len()
            }
            None => return 0,
        };
        if delivered == 0 {
            connections.remove(&subject);
        }
        metrics::set_ws_connections(total_of(&connections));
        delivered
    }

    /// Deliver a pre-serialized event to one connection.
    ///
    /// Returns false when the connection is gone or its session stopped
    /// receiving, so callers holding a stale id can drop it.
    pub async fn push_to_connection(
        &self,
        subject: Uuid,
        connection_id: ConnectionId,
        payload: &str,
    ) -> bool {
        let connections = self.connections.read().await;
        connections
            .get(&subject)
            .and_then(|entries| entries.iter().find(|c| c.id == connection_id))
            .map(|c| c.sender.send(payload.to_string()).is_ok())
            .unwrap_or(false)
    }

    /// Forced invalidation: drop every connection the subject holds.
    ///
    /// Closing the senders ends each session's outbound loop, which in turn
    /// terminates the underlying transport. Returns how many connections
    /// were dropped.
    pub async fn disconnect_subject(&self, subject: Uuid) -> usize {
        let mut connections = self.connections.write().await;
        let dropped = connections.remove(&subject).map(|v| v.len()).unwrap_or(0);
        metrics::set_ws_connections(total_of(&connections));
        dropped
    }

    pub async fn connection_count(&self, subject: Uuid) -> usize {
        let connections = self.connections.read().await;
        connections.get(&subject).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        let connections = self.connections.read().await;
        total_of(&connections)
    }

    pub async fn subject_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Connections that have joined at least one room.
    pub async fn active_connections(&self) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .flatten()
            .filter(|c| c.state == ConnectionState::Active)
            .count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn total_of(connections: &HashMap<Uuid, Vec<Connection>>) -> usize {
    connections.values().map(Vec::len).sum()
}
