//! Wire types shared by the Discuss room coordinator and its clients.
//!
//! Every frame on the signaling socket is a JSON object tagged by a kebab-case
//! `type` field with camelCase payload fields:
//!
//! ```json
//! {"type": "join-room", "roomId": "K3F9QZ", "peerId": "p-1", "displayName": "Ada"}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest capacity a room can be created with.
pub const MIN_CAPACITY: u32 = 2;
/// Largest capacity a room can be created with.
pub const MAX_CAPACITY: u32 = 10;
/// Capacity used when a create request omits it.
pub const DEFAULT_CAPACITY: u32 = 8;

/// Length of generated room codes.
pub const ROOM_CODE_LEN: usize = 6;
pub const MAX_ROOM_NAME_LEN: usize = 64;
pub const MAX_DISPLAY_NAME_LEN: usize = 32;
pub const MAX_PEER_ID_LEN: usize = 128;
pub const MAX_CHAT_LEN: usize = 2000;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a room (a short upper-case code).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of one real-time connection (one browser tab).
/// Assigned by the server when the socket is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle the media-negotiation layer uses to address a participant directly.
/// Opaque to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Shared payloads
// ============================================================================

/// Public view of a room. Never carries the password, only whether one is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub count: u32,
    pub capacity: u32,
    pub has_password: bool,
}

/// A participant as other participants see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub peer_id: PeerId,
    pub display_name: String,
}

/// Reason codes surfaced to the originating connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    RoomNotFound,
    RoomFull,
    WrongPassword,
    InvalidInput,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::RoomNotFound => "RoomNotFound",
            ErrorCode::RoomFull => "RoomFull",
            ErrorCode::WrongPassword => "WrongPassword",
            ErrorCode::InvalidInput => "InvalidInput",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Client -> server
// ============================================================================

/// Requests a client may send over the signaling socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Ask for a fresh room list.
    ListRooms,
    /// Create a room. Capacity is clamped into range by the server.
    CreateRoom {
        name: String,
        #[serde(default)]
        capacity: Option<i64>,
        #[serde(default)]
        password: Option<String>,
    },
    /// Join a room under the given peer id.
    JoinRoom {
        room_id: RoomId,
        peer_id: PeerId,
        #[serde(default)]
        display_name: String,
        #[serde(default)]
        password: Option<String>,
    },
    /// Leave the room the connection is currently in.
    LeaveRoom { room_id: RoomId },
    /// Remove another participant (room owner only).
    KickParticipant { target_peer_id: PeerId },
    /// Send a chat line to everyone in the current room.
    SendChat { text: String },
}

impl ClientMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(DecodeError::from)
    }

    /// Encode into a text frame.
    pub fn encode(&self) -> Result<String, EncodeError> {
        serde_json::to_string(self).map_err(EncodeError::from)
    }
}

// ============================================================================
// Server -> client
// ============================================================================

/// Events the coordinator pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Current public room list. Sent to every connection on change.
    RoomList { rooms: Vec<RoomSummary> },
    /// Reply to the creator of a room.
    RoomCreated { room_id: RoomId },
    /// Someone else entered the caller's room.
    ParticipantJoined {
        peer_id: PeerId,
        display_name: String,
    },
    /// Sent to a joiner: who to open media links to.
    ExistingParticipants { participants: Vec<ParticipantInfo> },
    /// Someone else left the caller's room.
    ParticipantLeft { peer_id: PeerId },
    /// A chat line. Timestamp is Unix milliseconds.
    ChatMessage {
        text: String,
        sender_peer_id: PeerId,
        sender_name: String,
        timestamp: u64,
    },
    /// The receiving connection was removed by the room owner.
    Kicked,
    /// A request from this connection failed.
    Error { reason: ErrorCode },
}

impl ServerMessage {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::RoomList { .. } => "room-list",
            ServerMessage::RoomCreated { .. } => "room-created",
            ServerMessage::ParticipantJoined { .. } => "participant-joined",
            ServerMessage::ExistingParticipants { .. } => "existing-participants",
            ServerMessage::ParticipantLeft { .. } => "participant-left",
            ServerMessage::ChatMessage { .. } => "chat-message",
            ServerMessage::Kicked => "kicked",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(DecodeError::from)
    }

    /// Encode into a text frame.
    pub fn encode(&self) -> Result<String, EncodeError> {
        serde_json::to_string(self).map_err(EncodeError::from)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}
