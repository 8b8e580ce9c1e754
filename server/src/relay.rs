//! Signaling relay.
//!
//! Passes chat lines and peer identifiers between participants so the
//! external media layer can open direct links. Media never passes through
//! here and nothing is buffered or stored.

use crate::broadcast::BroadcastRouter;
use crate::error::CoordinatorError;
use crate::room::{Admission, Departure, Participant, RoomSnapshot};
use crate::validate;
use discuss_protocol::{ConnectionId, ServerMessage};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct SignalingRelay {
    router: Arc<BroadcastRouter>,
}

impl SignalingRelay {
    pub fn new(router: Arc<BroadcastRouter>) -> Self {
        Self { router }
    }

    /// Hand the joiner the peers it should call, and tell those peers who arrived.
    pub fn announce_arrival(&self, joiner: &Participant, admission: &Admission) {
        self.router.to_connection(
            joiner.connection,
            &ServerMessage::ExistingParticipants {
                participants: admission.others.clone(),
            },
        );
        self.router.to_room_except(
            &admission.room,
            joiner.connection,
            &ServerMessage::ParticipantJoined {
                peer_id: joiner.peer_id.clone(),
                display_name: joiner.display_name.clone(),
            },
        );
    }

    /// Tell the remaining participants who left.
    pub fn announce_departure(&self, departure: &Departure) {
        self.router.to_room_except(
            &departure.room,
            departure.participant.connection,
            &ServerMessage::ParticipantLeft {
                peer_id: departure.participant.peer_id.clone(),
            },
        );
    }

    /// Broadcast a chat line to the whole room, sender included.
    pub fn relay_chat(
        &self,
        room: &RoomSnapshot,
        sender: ConnectionId,
        text: &str,
    ) -> Result<(), CoordinatorError> {
        let text = validate::chat_text(text)?;
        let sender = room
            .participant(sender)
            .ok_or(CoordinatorError::NotConnected)?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        tracing::debug!(room = %room.id, peer = %sender.peer_id, "chat");
        self.router.to_room(
            room,
            &ServerMessage::ChatMessage {
                text,
                sender_peer_id: sender.peer_id.clone(),
                sender_name: sender.display_name.clone(),
                timestamp,
            },
        );
        Ok(())
    }
}
