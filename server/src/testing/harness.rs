//! Test harness for coordinator scenarios.

use crate::broadcast::BroadcastRouter;
use crate::error::CoordinatorError;
use crate::room::{CapacityBounds, RoomRegistry};
use crate::session::SessionBinder;
use discuss_protocol::{ConnectionId, ParticipantInfo, PeerId, RoomId, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A connected client whose outbound events land in a queue.
pub struct TestClient {
    pub id: ConnectionId,
    rx: mpsc::Receiver<Arc<String>>,
}

impl TestClient {
    /// Everything routed to this client since the last drain.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            messages.push(ServerMessage::decode(&frame).expect("server sent undecodable frame"));
        }
        messages
    }

    /// Drain and keep only events of one kind.
    pub fn drain_kind(&mut self, kind: &str) -> Vec<ServerMessage> {
        self.drain().into_iter().filter(|m| m.kind() == kind).collect()
    }
}

/// Coordinator wired to an in-memory router.
pub struct TestCoordinator {
    pub binder: Arc<SessionBinder>,
}

impl TestCoordinator {
    pub fn new() -> Self {
        Self::with_bounds(CapacityBounds::default())
    }

    pub fn with_bounds(bounds: CapacityBounds) -> Self {
        let registry = Arc::new(RoomRegistry::new(bounds));
        let router = Arc::new(BroadcastRouter::new());
        Self {
            binder: Arc::new(SessionBinder::new(registry, router)),
        }
    }

    /// Connect a client and discard its initial room list.
    pub async fn connect(&self) -> TestClient {
        let (tx, rx) = mpsc::channel(256);
        let id = self.binder.connect(tx).await;
        let mut client = TestClient { id, rx };
        let _ = client.drain();
        client
    }

    /// Create a room on behalf of `creator`.
    pub async fn create_room(
        &self,
        creator: &TestClient,
        name: &str,
        capacity: i64,
        password: Option<&str>,
    ) -> RoomId {
        self.binder
            .create_room(Some(creator.id), name, Some(capacity), password)
            .await
            .expect("room creation failed")
    }

    pub async fn join(
        &self,
        client: &TestClient,
        room_id: &RoomId,
        peer: &str,
        password: Option<&str>,
    ) -> Result<Vec<ParticipantInfo>, CoordinatorError> {
        self.binder
            .join(
                client.id,
                room_id.clone(),
                PeerId::from(peer),
                &peer.to_uppercase(),
                password,
            )
            .await
    }

    /// Peer ids currently in the room, in join order.
    pub async fn peers(&self, room_id: &RoomId) -> Vec<String> {
        match self.binder.registry().get_room(room_id).await {
            Ok(room) => room.participants.into_iter().map(|p| p.peer_id.0).collect(),
            Err(_) => Vec::new(),
        }
    }
}
