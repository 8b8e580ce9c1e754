//! Event fan-out to connected clients.
//!
//! Every delivery is a non-blocking enqueue onto the recipient's bounded
//! outbound queue, so a stalled socket never holds up the sender. Recipients
//! of room-scoped deliveries come from a [`RoomSnapshot`] taken under the
//! room lock.

use crate::room::RoomSnapshot;
use dashmap::DashMap;
use discuss_protocol::{ConnectionId, ServerMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Lifetime message drops after which a slow client is evicted.
pub const MAX_TOTAL_DROPS: u64 = 100;

/// Outbound half of one client connection.
pub struct ClientConnection {
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    drops: AtomicU64,
}

impl ClientConnection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            drops: AtomicU64::new(0),
        }
    }

    /// Enqueue without waiting. Returns `false` if the queue was full.
    fn send(&self, frame: Arc<String>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let _ = self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
            // Socket already gone; disconnect cleanup is on its way.
            Err(TrySendError::Closed(_)) => true,
        }
    }

    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// Routes server events to the right audience.
pub struct BroadcastRouter {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Start routing to a connection.
    pub fn register(&self, connection: Arc<ClientConnection>) {
        let _ = self.connections.insert(connection.id, connection);
    }

    /// Stop routing to a connection. Dropping the last sender closes its socket.
    pub fn unregister(&self, id: ConnectionId) {
        let _ = self.connections.remove(&id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Deliver to every participant of the room.
    pub fn to_room(&self, room: &RoomSnapshot, event: &ServerMessage) {
        self.deliver(room.connections(), event, &room.id.0);
    }

    /// Deliver to every participant of the room except `exclude`.
    pub fn to_room_except(
        &self,
        room: &RoomSnapshot,
        exclude: ConnectionId,
        event: &ServerMessage,
    ) {
        let recipients = room.connections().filter(|id| *id != exclude);
        self.deliver(recipients, event, &room.id.0);
    }

    /// Deliver to every connected client regardless of room.
    pub fn to_all(&self, event: &ServerMessage) {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|c| *c.key()).collect();
        self.deliver(ids.into_iter(), event, "all");
    }

    /// Deliver to exactly one client.
    pub fn to_connection(&self, id: ConnectionId, event: &ServerMessage) {
        self.deliver(std::iter::once(id), event, "direct");
    }

    /// Serialize once, fan out, evict clients past the drop threshold.
    fn deliver(
        &self,
        recipients: impl Iterator<Item = ConnectionId>,
        event: &ServerMessage,
        label: &str,
    ) {
        let frame = match event.encode() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                tracing::warn!(kind = event.kind(), error = %e, "failed to serialize event");
                return;
            }
        };

        let mut evict = Vec::new();
        let mut delivered = 0u32;
        for id in recipients {
            let Some(conn) = self.connections.get(&id).map(|c| Arc::clone(c.value())) else {
                continue;
            };
            if conn.send(Arc::clone(&frame)) {
                delivered += 1;
                continue;
            }
            let drops = conn.drop_count();
            if drops >= MAX_TOTAL_DROPS {
                tracing::warn!(conn = %id, label, drops, "disconnecting slow client");
                evict.push(id);
            } else {
                tracing::warn!(conn = %id, label, total_drops = drops, "outbound queue full, event dropped");
            }
        }
        tracing::debug!(kind = event.kind(), label, delivered, "routed event");

        for id in evict {
            self.unregister(id);
        }
    }
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new()
    }
}
