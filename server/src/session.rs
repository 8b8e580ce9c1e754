//! Session binder.
//!
//! Binds each connection to at most one (room, peer) pair and is the only
//! path through which participants enter or leave a room. Per-connection
//! state is a small state machine:
//!
//! ```text
//! Connected --join--> InRoom --leave/kick--> Connected
//!     \                  |
//!      +---disconnect----+--> (removed)
//! ```
//!
//! Registry mutations happen under the room lock; every resulting event is
//! routed after the lock is released, from the snapshot taken under it, and
//! before the triggering call returns.
//!
//! Each connection also has a membership lock. Its joins and leaves, and any
//! kick aimed at it, hold that lock from the registry change through the
//! session update and announcements, so those steps never interleave.

use crate::broadcast::{BroadcastRouter, ClientConnection};
use crate::error::CoordinatorError;
use crate::relay::SignalingRelay;
use crate::room::{Departure, Participant, RoomRegistry};
use crate::validate;
use dashmap::DashMap;
use discuss_protocol::{
    ClientMessage, ConnectionId, ErrorCode, ParticipantInfo, PeerId, RoomId, ServerMessage,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Where a live connection currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    InRoom {
        room_id: RoomId,
        peer_id: PeerId,
        display_name: String,
    },
}

pub struct SessionBinder {
    registry: Arc<RoomRegistry>,
    router: Arc<BroadcastRouter>,
    relay: SignalingRelay,
    /// Live sessions. Absence means disconnected.
    sessions: DashMap<ConnectionId, SessionState>,
    /// Per-connection membership lock.
    membership: DashMap<ConnectionId, Arc<Mutex<()>>>,
    next_connection_id: AtomicU64,
    /// Serializes room-list publication so the last list sent is never stale.
    room_list_gate: Mutex<()>,
}

impl SessionBinder {
    pub fn new(registry: Arc<RoomRegistry>, router: Arc<BroadcastRouter>) -> Self {
        Self {
            registry,
            relay: SignalingRelay::new(Arc::clone(&router)),
            router,
            sessions: DashMap::new(),
            membership: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
            room_list_gate: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Current state of a connection, `None` once disconnected.
    pub fn session(&self, conn: ConnectionId) -> Option<SessionState> {
        self.sessions.get(&conn).map(|s| s.value().clone())
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    /// Register a new connection whose outbound frames go to `tx`.
    /// The caller immediately receives the current room list.
    pub async fn connect(&self, tx: mpsc::Sender<Arc<String>>) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::SeqCst));
        self.router.register(Arc::new(ClientConnection::new(id, tx)));
        let _ = self.membership.insert(id, Arc::new(Mutex::new(())));
        let _ = self.sessions.insert(id, SessionState::Connected);
        tracing::debug!(conn = %id, "connected");

        let rooms = self.registry.list_rooms().await;
        self.router
            .to_connection(id, &ServerMessage::RoomList { rooms });
        id
    }

    /// Channel closed. Runs the leave cleanup at most once per connection.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let Some((_, state)) = self.sessions.remove(&conn) else {
            return;
        };
        let _ = self.membership.remove(&conn);
        tracing::debug!(conn = %conn, "disconnected");
        if let SessionState::InRoom { room_id, .. } = state {
            self.remove_participant(&room_id, conn).await;
        }
        self.router.unregister(conn);
    }

    // ------------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------------

    /// Decode one text frame and act on it.
    pub async fn handle_frame(&self, conn: ConnectionId, frame: &str) {
        match ClientMessage::decode(frame) {
            Ok(message) => self.handle(conn, message).await,
            Err(e) => {
                tracing::warn!(conn = %conn, error = %e, "malformed frame");
                self.reject_malformed(conn);
            }
        }
    }

    /// Reply `InvalidInput` to a frame that could not be decoded.
    pub fn reject_malformed(&self, conn: ConnectionId) {
        self.router.to_connection(
            conn,
            &ServerMessage::Error {
                reason: ErrorCode::InvalidInput,
            },
        );
    }

    /// Act on a decoded request. Failures go back to `conn` only.
    pub async fn handle(&self, conn: ConnectionId, message: ClientMessage) {
        let result = match message {
            ClientMessage::ListRooms => {
                self.list_rooms(conn).await;
                Ok(())
            }
            ClientMessage::CreateRoom {
                name,
                capacity,
                password,
            } => self
                .create_room(Some(conn), &name, capacity, password.as_deref())
                .await
                .map(|_| ()),
            ClientMessage::JoinRoom {
                room_id,
                peer_id,
                display_name,
                password,
            } => self
                .join(conn, room_id, peer_id, &display_name, password.as_deref())
                .await
                .map(|_| ()),
            ClientMessage::LeaveRoom { room_id } => {
                self.leave(conn, &room_id).await;
                Ok(())
            }
            ClientMessage::KickParticipant { target_peer_id } => {
                self.kick(conn, &target_peer_id).await
            }
            ClientMessage::SendChat { text } => self.send_chat(conn, &text).await,
        };

        if let Err(e) = result {
            match e.reason() {
                Some(reason) => {
                    tracing::debug!(conn = %conn, error = %e, "request rejected");
                    self.router
                        .to_connection(conn, &ServerMessage::Error { reason });
                }
                None => tracing::debug!(conn = %conn, error = %e, "request dropped"),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    pub async fn list_rooms(&self, conn: ConnectionId) {
        let rooms = self.registry.list_rooms().await;
        self.router
            .to_connection(conn, &ServerMessage::RoomList { rooms });
    }

    /// Create a room. `creator` is the requesting connection, if any (REST
    /// creations have none); it becomes the room owner once it joins.
    pub async fn create_room(
        &self,
        creator: Option<ConnectionId>,
        name: &str,
        capacity: Option<i64>,
        password: Option<&str>,
    ) -> Result<RoomId, CoordinatorError> {
        let room_id = self
            .registry
            .create_room(name, capacity, password, creator)?;
        if let Some(conn) = creator {
            self.router.to_connection(
                conn,
                &ServerMessage::RoomCreated {
                    room_id: room_id.clone(),
                },
            );
        }
        self.publish_room_list().await;
        Ok(room_id)
    }

    /// Enter a room. Returns the participants that were already there.
    ///
    /// A connection already in another room moves: it is admitted to the new
    /// room first and only then removed from the old one, so a failed join
    /// leaves everything as it was. Joining the current room again is
    /// `InvalidInput`.
    pub async fn join(
        &self,
        conn: ConnectionId,
        room_id: RoomId,
        peer_id: PeerId,
        display_name: &str,
        password: Option<&str>,
    ) -> Result<Vec<ParticipantInfo>, CoordinatorError> {
        validate::peer_id(&peer_id)?;
        let display_name = validate::display_name(display_name)?;

        let lock = self.membership_lock(conn).ok_or(CoordinatorError::NotConnected)?;
        let _membership = lock.lock().await;

        let previous = match self.session(conn) {
            None => return Err(CoordinatorError::NotConnected),
            Some(SessionState::InRoom {
                room_id: current, ..
            }) if current == room_id => {
                return Err(CoordinatorError::InvalidInput(
                    "already in this room".to_string(),
                ));
            }
            Some(SessionState::InRoom {
                room_id: current, ..
            }) => Some(current),
            Some(SessionState::Connected) => None,
        };

        let participant = Participant {
            connection: conn,
            peer_id: peer_id.clone(),
            display_name: display_name.clone(),
        };
        let admission = self
            .registry
            .join(&room_id, participant.clone(), password)
            .await?;

        if let Some(previous) = previous {
            self.remove_participant(&previous, conn).await;
        }

        let bound = match self.sessions.get_mut(&conn) {
            Some(mut state) => {
                *state = SessionState::InRoom {
                    room_id: room_id.clone(),
                    peer_id: peer_id.clone(),
                    display_name,
                };
                true
            }
            None => false,
        };
        if !bound {
            // Disconnect fired while the join was in flight. Nobody has been
            // told about the arrival, so undo it without announcing.
            if self.registry.leave(&room_id, conn).await.is_some() {
                self.publish_room_list().await;
            }
            return Err(CoordinatorError::NotConnected);
        }

        tracing::info!(conn = %conn, room = %room_id, peer = %peer_id, "participant joined");
        self.relay.announce_arrival(&participant, &admission);
        self.publish_room_list().await;
        Ok(admission.others)
    }

    /// Leave `room_id`. A no-op unless the connection is currently in it.
    pub async fn leave(&self, conn: ConnectionId, room_id: &RoomId) {
        let Some(lock) = self.membership_lock(conn) else {
            return;
        };
        let _membership = lock.lock().await;

        let was_in_room = match self.sessions.get_mut(&conn) {
            Some(mut state) => {
                let in_room = matches!(
                    &*state,
                    SessionState::InRoom { room_id: current, .. } if current == room_id
                );
                if in_room {
                    *state = SessionState::Connected;
                }
                in_room
            }
            None => false,
        };
        if was_in_room {
            self.remove_participant(room_id, conn).await;
        }
    }

    /// Remove `target` from the requester's room. Only the room owner may
    /// kick; anything else is dropped without telling the requester.
    ///
    /// A join by the target that is still in flight finishes, announcements
    /// included, before the kick takes effect.
    pub async fn kick(&self, conn: ConnectionId, target: &PeerId) -> Result<(), CoordinatorError> {
        let Some(SessionState::InRoom {
            room_id, peer_id, ..
        }) = self.session(conn)
        else {
            return Err(CoordinatorError::Unauthorized);
        };

        let room = self.registry.get_room(&room_id).await?;
        if room.owner.as_ref() != Some(&peer_id) {
            return Err(CoordinatorError::Unauthorized);
        }
        let Some(kicked) = room
            .participants
            .iter()
            .find(|p| &p.peer_id == target && p.connection != conn)
            .map(|p| p.connection)
        else {
            return Ok(());
        };
        // Gone already; disconnect cleanup owns the removal.
        let Some(lock) = self.membership_lock(kicked) else {
            return Ok(());
        };
        let _membership = lock.lock().await;

        let Some(departure) = self.registry.kick(&room_id, &peer_id, kicked).await? else {
            return Ok(());
        };

        if let Some(mut state) = self.sessions.get_mut(&kicked) {
            let still_here = matches!(
                &*state,
                SessionState::InRoom { room_id: current, .. } if *current == room_id
            );
            if still_here {
                *state = SessionState::Connected;
            }
        }

        tracing::info!(room = %room_id, by = %peer_id, peer = %target, "participant kicked");
        self.router.to_connection(kicked, &ServerMessage::Kicked);
        self.finish_departure(&departure).await;
        Ok(())
    }

    /// Relay a chat line to the sender's room.
    pub async fn send_chat(&self, conn: ConnectionId, text: &str) -> Result<(), CoordinatorError> {
        let Some(SessionState::InRoom { room_id, .. }) = self.session(conn) else {
            return Err(CoordinatorError::InvalidInput("not in a room".to_string()));
        };
        let room = self.registry.get_room(&room_id).await?;
        self.relay.relay_chat(&room, conn, text)
    }

    /// Drop rooms nobody ever joined. Called periodically by the server.
    pub async fn sweep_unclaimed(&self, max_age: Duration) {
        if !self.registry.sweep_unclaimed(max_age).await.is_empty() {
            self.publish_room_list().await;
        }
    }

    /// Push the current room list to every connection.
    pub async fn publish_room_list(&self) {
        let _gate = self.room_list_gate.lock().await;
        let rooms = self.registry.list_rooms().await;
        self.router.to_all(&ServerMessage::RoomList { rooms });
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn membership_lock(&self, conn: ConnectionId) -> Option<Arc<Mutex<()>>> {
        self.membership.get(&conn).map(|lock| Arc::clone(lock.value()))
    }

    async fn remove_participant(&self, room_id: &RoomId, conn: ConnectionId) {
        if let Some(departure) = self.registry.leave(room_id, conn).await {
            tracing::info!(
                conn = %conn,
                room = %room_id,
                peer = %departure.participant.peer_id,
                "participant left"
            );
            self.finish_departure(&departure).await;
        }
    }

    async fn finish_departure(&self, departure: &Departure) {
        self.relay.announce_departure(departure);
        self.publish_room_list().await;
    }
}
