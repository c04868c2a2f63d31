// SPDX-License-Identifier: MIT

//! Presence channel registry — live connection bookkeeping.
//!
//! Maps user identities to their currently connected WebSocket sinks. State
//! is process-local and ephemeral: it is built from nothing at startup and
//! every client must rejoin after a daemon restart. Delivery is
//! fire-and-forget, at-most-once per connection, FIFO per connection.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Sender half of one connection's outbound event queue. The connection task
/// drains the receiver into its WebSocket sink.
pub type EventSender = mpsc::UnboundedSender<String>;

struct Connection {
    user_id: String,
    sender: EventSender,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    /// User identity → live connection set. An empty set is left in place
    /// after the last leave; the channel is lazily re-filled on next join.
    channels: HashMap<String, HashSet<ConnectionId>>,
}

/// Injected singleton owning all channel membership. Constructed once at
/// process start; join/leave/broadcast are its only mutation surface.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: Mutex<Inner>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to `user_id`'s channel. A user may hold any number
    /// of simultaneous connections (multi-tab, multi-device); each receives
    /// its own copy of every event addressed to that user.
    pub fn join(&self, user_id: &str, sender: EventSender) -> ConnectionId {
        let conn_id = Uuid::new_v4();
        let mut inner = self.inner.lock().expect("presence lock poisoned");
        inner.connections.insert(
            conn_id,
            Connection {
                user_id: user_id.to_string(),
                sender,
            },
        );
        inner
            .channels
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id);
        debug!(user = %user_id, conn = %conn_id, "presence join");
        conn_id
    }

    /// Remove a connection. Unknown ids are a no-op (a connection may race
    /// its own disconnect).
    pub fn leave(&self, conn_id: ConnectionId) {
        let mut inner = self.inner.lock().expect("presence lock poisoned");
        if let Some(conn) = inner.connections.remove(&conn_id) {
            if let Some(members) = inner.channels.get_mut(&conn.user_id) {
                members.remove(&conn_id);
            }
            debug!(user = %conn.user_id, conn = %conn_id, "presence leave");
        }
    }

    /// Deliver an event to every connection in one user's channel.
    /// No-op when the user has no live connections.
    pub fn broadcast_to(&self, user_id: &str, event: &str, payload: Value) {
        let frame = notification_frame(event, payload);
        let inner = self.inner.lock().expect("presence lock poisoned");
        if let Some(members) = inner.channels.get(user_id) {
            for conn_id in members {
                if let Some(conn) = inner.connections.get(conn_id) {
                    // Send errors mean the connection task is gone; the
                    // leave() on its disconnect path cleans up.
                    let _ = conn.sender.send(frame.clone());
                }
            }
        }
    }

    /// Deliver an event to every connection of every user.
    pub fn broadcast_all(&self, event: &str, payload: Value) {
        let frame = notification_frame(event, payload);
        let inner = self.inner.lock().expect("presence lock poisoned");
        for conn in inner.connections.values() {
            let _ = conn.sender.send(frame.clone());
        }
    }

    /// Total live connections across all users.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().expect("presence lock poisoned").connections.len()
    }

    /// Live connection count for one user.
    pub fn channel_size(&self, user_id: &str) -> usize {
        self.inner
            .lock()
            .expect("presence lock poisoned")
            .channels
            .get(user_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

/// Frame an event as a JSON-RPC 2.0 notification string.
fn notification_frame(event: &str, payload: Value) -> String {
    serde_json::to_string(&serde_json::json!({
        "jsonrpc": "2.0",
        "method": event,
        "params": payload
    }))
    .unwrap_or_default()
}
