//! Room registry.
//!
//! Owns every live room and its participant list. Each room sits behind its
//! own mutex so join/leave/kick on one room are linearizable while different
//! rooms never contend. Callers only ever receive [`RoomSnapshot`] copies.

use crate::error::CoordinatorError;
use crate::validate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use discuss_protocol::{
    ConnectionId, ParticipantInfo, PeerId, RoomId, RoomSummary, DEFAULT_CAPACITY, MAX_CAPACITY,
    ROOM_CODE_LEN,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

// ============================================================================
// Public data
// ============================================================================

/// One connected user inside a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection: ConnectionId,
    pub peer_id: PeerId,
    pub display_name: String,
}

impl Participant {
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            peer_id: self.peer_id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Point-in-time copy of a room, taken under the room lock.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
    pub has_password: bool,
    /// Participants in join order.
    pub participants: Vec<Participant>,
    /// Peer allowed to kick others.
    pub owner: Option<PeerId>,
}

impl RoomSnapshot {
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            count: self.participants.len() as u32,
            capacity: self.capacity,
            has_password: self.has_password,
        }
    }

    /// Connection ids of every participant.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.participants.iter().map(|p| p.connection)
    }

    pub fn participant(&self, connection: ConnectionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.connection == connection)
    }
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Room as it looks with the joiner included.
    pub room: RoomSnapshot,
    /// Everyone who was already there, in join order.
    pub others: Vec<ParticipantInfo>,
}

/// Result of removing a participant.
#[derive(Debug, Clone)]
pub struct Departure {
    pub participant: Participant,
    /// Room as it looks after the removal.
    pub room: RoomSnapshot,
    /// The removal emptied the room and it was deleted.
    pub room_removed: bool,
}

/// Capacity policy applied at creation.
#[derive(Debug, Clone, Copy)]
pub struct CapacityBounds {
    pub default: u32,
    pub max: u32,
}

impl Default for CapacityBounds {
    fn default() -> Self {
        Self {
            default: DEFAULT_CAPACITY,
            max: MAX_CAPACITY,
        }
    }
}

// ============================================================================
// Internal room entry
// ============================================================================

struct RoomEntry {
    id: RoomId,
    name: String,
    capacity: u32,
    password_digest: Option<[u8; 32]>,
    /// Connection that issued the create request, if any.
    created_by: Option<ConnectionId>,
    participants: Vec<Participant>,
    /// Creation time (Instant for sweep calculations).
    created_at: Instant,
    /// Creation time (Unix timestamp, used for list ordering).
    created_at_unix: u64,
    ever_joined: bool,
    /// Set once the entry has been unlinked from the registry map.
    closed: bool,
}

impl RoomEntry {
    fn owner(&self) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| Some(p.connection) == self.created_by)
            .or_else(|| self.participants.first())
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            capacity: self.capacity,
            has_password: self.password_digest.is_some(),
            participants: self.participants.clone(),
            owner: self.owner().map(|p| p.peer_id.clone()),
        }
    }

    fn password_matches(&self, provided: Option<&str>) -> bool {
        match &self.password_digest {
            None => true,
            Some(expected) => provided
                .and_then(validate::password)
                .map(|p| digest(p) == *expected)
                .unwrap_or(false),
        }
    }

    fn remove(&mut self, connection: ConnectionId) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.connection == connection)?;
        Some(self.participants.remove(index))
    }
}

fn digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

fn generate_code() -> RoomId {
    let code: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_CODE_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    RoomId(code)
}

// ============================================================================
// RoomRegistry
// ============================================================================

/// Manages all live rooms.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Mutex<RoomEntry>>>,
    bounds: CapacityBounds,
}

impl RoomRegistry {
    pub fn new(bounds: CapacityBounds) -> Self {
        Self {
            rooms: DashMap::new(),
            bounds,
        }
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Summaries of every live room, oldest first.
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms = Vec::with_capacity(self.rooms.len());
        for entry in self.entries() {
            let entry = entry.lock().await;
            if !entry.closed {
                rooms.push((entry.created_at_unix, entry.snapshot().summary()));
            }
        }
        rooms.sort_by(|(a_at, a), (b_at, b)| a_at.cmp(b_at).then_with(|| a.id.cmp(&b.id)));
        rooms.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Create a room and return its id.
    ///
    /// Capacity is clamped into the configured range; an empty password
    /// makes the room public.
    pub fn create_room(
        &self,
        name: &str,
        capacity: Option<i64>,
        password: Option<&str>,
        created_by: Option<ConnectionId>,
    ) -> Result<RoomId, CoordinatorError> {
        let name = validate::room_name(name)?;
        let capacity = validate::capacity(capacity, self.bounds);
        let password_digest = password.and_then(validate::password).map(digest);

        let created_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        loop {
            let id = generate_code();
            if let Entry::Vacant(slot) = self.rooms.entry(id.clone()) {
                slot.insert(Arc::new(Mutex::new(RoomEntry {
                    id: id.clone(),
                    name: name.clone(),
                    capacity,
                    password_digest,
                    created_by,
                    participants: Vec::new(),
                    created_at: Instant::now(),
                    created_at_unix,
                    ever_joined: false,
                    closed: false,
                })));
                tracing::info!(room = %id, %name, capacity, "room created");
                return Ok(id);
            }
        }
    }

    /// Snapshot of one room.
    pub async fn get_room(&self, room_id: &RoomId) -> Result<RoomSnapshot, CoordinatorError> {
        let entry = self.entry(room_id).ok_or(CoordinatorError::RoomNotFound)?;
        let entry = entry.lock().await;
        if entry.closed {
            return Err(CoordinatorError::RoomNotFound);
        }
        Ok(entry.snapshot())
    }

    /// Admit a participant.
    ///
    /// Checks run in order: room exists, password matches, room has space,
    /// peer id is free. Nothing is mutated unless all pass.
    pub async fn join(
        &self,
        room_id: &RoomId,
        participant: Participant,
        password: Option<&str>,
    ) -> Result<Admission, CoordinatorError> {
        let entry = self.entry(room_id).ok_or(CoordinatorError::RoomNotFound)?;
        let mut entry = entry.lock().await;

        if entry.closed {
            return Err(CoordinatorError::RoomNotFound);
        }
        if !entry.password_matches(password) {
            return Err(CoordinatorError::WrongPassword);
        }
        if entry.participants.len() >= entry.capacity as usize {
            return Err(CoordinatorError::RoomFull);
        }
        if entry
            .participants
            .iter()
            .any(|p| p.peer_id == participant.peer_id || p.connection == participant.connection)
        {
            return Err(CoordinatorError::InvalidInput(
                "peer already in room".to_string(),
            ));
        }

        let others = entry.participants.iter().map(Participant::info).collect();
        entry.participants.push(participant);
        entry.ever_joined = true;

        Ok(Admission {
            room: entry.snapshot(),
            others,
        })
    }

    /// Remove the participant bound to `connection`. Returns `None` if it was
    /// not in the room (already left, kicked, or room gone).
    pub async fn leave(&self, room_id: &RoomId, connection: ConnectionId) -> Option<Departure> {
        let handle = self.entry(room_id)?;
        let mut entry = handle.lock().await;
        if entry.closed {
            return None;
        }
        let participant = entry.remove(connection)?;
        let room_removed = self.close_if_empty(&handle, &mut entry);
        Some(Departure {
            participant,
            room: entry.snapshot(),
            room_removed,
        })
    }

    /// Remove the participant bound to `target` on behalf of `requester`.
    ///
    /// Fails with `Unauthorized` unless the requester is the room owner.
    /// Kicking oneself or a connection that is not present is a no-op.
    pub async fn kick(
        &self,
        room_id: &RoomId,
        requester: &PeerId,
        target: ConnectionId,
    ) -> Result<Option<Departure>, CoordinatorError> {
        let handle = self.entry(room_id).ok_or(CoordinatorError::RoomNotFound)?;
        let mut entry = handle.lock().await;
        if entry.closed {
            return Err(CoordinatorError::RoomNotFound);
        }
        if entry.owner().map(|p| &p.peer_id) != Some(requester) {
            return Err(CoordinatorError::Unauthorized);
        }
        let is_requester = entry
            .participants
            .iter()
            .any(|p| p.connection == target && &p.peer_id == requester);
        if is_requester {
            return Ok(None);
        }

        let Some(participant) = entry.remove(target) else {
            return Ok(None);
        };
        let room_removed = self.close_if_empty(&handle, &mut entry);
        Ok(Some(Departure {
            participant,
            room: entry.snapshot(),
            room_removed,
        }))
    }

    /// Delete the room if it has emptied out. Idempotent.
    /// Rooms nobody has joined yet are left to [`sweep_unclaimed`](Self::sweep_unclaimed).
    /// Returns whether this call removed it.
    pub async fn remove_room_if_empty(&self, room_id: &RoomId) -> bool {
        let Some(handle) = self.entry(room_id) else {
            return false;
        };
        let mut entry = handle.lock().await;
        if !entry.ever_joined {
            return false;
        }
        self.close_if_empty(&handle, &mut entry)
    }

    /// Delete rooms nobody has joined within `max_age` of creation.
    pub async fn sweep_unclaimed(&self, max_age: Duration) -> Vec<RoomId> {
        let now = Instant::now();
        let mut removed = Vec::new();
        for handle in self.entries() {
            let mut entry = handle.lock().await;
            if !entry.ever_joined
                && now.duration_since(entry.created_at) > max_age
                && self.close_if_empty(&handle, &mut entry)
            {
                tracing::info!(room = %entry.id, "unclaimed room expired and removed");
                removed.push(entry.id.clone());
            }
        }
        removed
    }

    /// Must be called with the room lock held.
    fn close_if_empty(&self, handle: &Arc<Mutex<RoomEntry>>, entry: &mut RoomEntry) -> bool {
        if entry.closed || !entry.participants.is_empty() {
            return false;
        }
        entry.closed = true;
        let _ = self
            .rooms
            .remove_if(&entry.id, |_, current| Arc::ptr_eq(current, handle));
        tracing::info!(room = %entry.id, "room removed");
        true
    }

    fn entry(&self, room_id: &RoomId) -> Option<Arc<Mutex<RoomEntry>>> {
        self.rooms.get(room_id).map(|e| Arc::clone(e.value()))
    }

    /// Clone out the handles so no map guard is held across an await.
    fn entries(&self) -> Vec<Arc<Mutex<RoomEntry>>> {
        self.rooms.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Take a room's lock and keep it, stalling every operation on that room
    /// until the returned guard is dropped.
    #[cfg(test)]
    pub(crate) async fn hold(&self, room_id: &RoomId) -> Option<RoomHold> {
        let handle = self.entry(room_id)?;
        Some(RoomHold {
            _guard: handle.lock_owned().await,
        })
    }
}

#[cfg(test)]
pub(crate) struct RoomHold {
    _guard: tokio::sync::OwnedMutexGuard<RoomEntry>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(CapacityBounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(conn: u64, peer: &str) -> Participant {
        Participant {
            connection: ConnectionId(conn),
            peer_id: PeerId::from(peer),
            display_name: peer.to_uppercase(),
        }
    }

    #[tokio::test]
    async fn create_rejects_empty_name() {
        let registry = RoomRegistry::default();
        let err = registry.create_room("   ", Some(4), None, None).unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidInput(_)));
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn create_clamps_capacity() {
        let registry = RoomRegistry::default();
        let low = registry.create_room("low", Some(-3), None, None).unwrap();
        let high = registry.create_room("high", Some(500), None, None).unwrap();
        let default = registry.create_room("default", None, None, None).unwrap();

        assert_eq!(registry.get_room(&low).await.unwrap().capacity, 2);
        assert_eq!(registry.get_room(&high).await.unwrap().capacity, MAX_CAPACITY);
        assert_eq!(
            registry.get_room(&default).await.unwrap().capacity,
            DEFAULT_CAPACITY
        );
    }

    #[tokio::test]
    async fn room_codes_are_short_upper_case() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("codes", None, None, None).unwrap();
        assert_eq!(id.0.len(), ROOM_CODE_LEN);
        assert!(id
            .0
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn list_rooms_reports_password_flag_and_count() {
        let registry = RoomRegistry::default();
        let id = registry
            .create_room("secret", Some(4), Some("hunter2"), None)
            .unwrap();
        registry
            .join(&id, participant(1, "a"), Some("hunter2"))
            .await
            .unwrap();

        let rooms = registry.list_rooms().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "secret");
        assert_eq!(rooms[0].count, 1);
        assert_eq!(rooms[0].capacity, 4);
        assert!(rooms[0].has_password);
    }

    #[tokio::test]
    async fn empty_password_means_public() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("open", None, Some(""), None).unwrap();
        let room = registry.get_room(&id).await.unwrap();
        assert!(!room.has_password);
        registry.join(&id, participant(1, "a"), None).await.unwrap();
    }

    #[tokio::test]
    async fn join_checks_run_in_order() {
        let registry = RoomRegistry::default();
        let missing = RoomId::from("NOPE00");
        assert_eq!(
            registry
                .join(&missing, participant(1, "a"), None)
                .await
                .unwrap_err(),
            CoordinatorError::RoomNotFound
        );

        let id = registry.create_room("pair", Some(2), Some("pw"), None).unwrap();
        registry.join(&id, participant(1, "a"), Some("pw")).await.unwrap();
        registry.join(&id, participant(2, "b"), Some("pw")).await.unwrap();

        // Full room with the wrong password reports the password first.
        assert_eq!(
            registry
                .join(&id, participant(3, "c"), Some("bad"))
                .await
                .unwrap_err(),
            CoordinatorError::WrongPassword
        );
        assert_eq!(
            registry
                .join(&id, participant(3, "c"), Some("pw"))
                .await
                .unwrap_err(),
            CoordinatorError::RoomFull
        );
        assert_eq!(registry.get_room(&id).await.unwrap().participants.len(), 2);
    }

    #[tokio::test]
    async fn join_returns_others_in_join_order() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("order", Some(4), None, None).unwrap();
        registry.join(&id, participant(1, "a"), None).await.unwrap();
        registry.join(&id, participant(2, "b"), None).await.unwrap();
        let admission = registry.join(&id, participant(3, "c"), None).await.unwrap();

        let peers: Vec<_> = admission.others.iter().map(|p| p.peer_id.0.as_str()).collect();
        assert_eq!(peers, ["a", "b"]);
        assert_eq!(admission.room.participants.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_peer_id_rejected() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("dupe", Some(4), None, None).unwrap();
        registry.join(&id, participant(1, "a"), None).await.unwrap();
        let err = registry.join(&id, participant(2, "a"), None).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn leave_is_idempotent_and_removes_empty_room() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("solo", Some(2), None, None).unwrap();
        registry.join(&id, participant(1, "a"), None).await.unwrap();

        let departure = registry.leave(&id, ConnectionId(1)).await.unwrap();
        assert!(departure.room_removed);
        assert_eq!(departure.participant.peer_id, PeerId::from("a"));
        assert!(registry.leave(&id, ConnectionId(1)).await.is_none());
        assert_eq!(
            registry.get_room(&id).await.unwrap_err(),
            CoordinatorError::RoomNotFound
        );
    }

    #[tokio::test]
    async fn remove_room_if_empty_is_noop_when_occupied_or_missing() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("busy", Some(2), None, None).unwrap();
        registry.join(&id, participant(1, "a"), None).await.unwrap();

        assert!(!registry.remove_room_if_empty(&id).await);
        assert!(!registry.remove_room_if_empty(&RoomId::from("GHOST1")).await);
        assert_eq!(registry.room_count(), 1);
    }

    #[tokio::test]
    async fn remove_room_if_empty_keeps_never_joined_rooms() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("fresh", Some(2), None, None).unwrap();

        assert!(!registry.remove_room_if_empty(&id).await);
        assert!(registry.get_room(&id).await.is_ok());
        assert_eq!(registry.room_count(), 1);
    }

    #[tokio::test]
    async fn owner_is_creator_then_earliest_joiner() {
        let registry = RoomRegistry::default();
        let id = registry
            .create_room("owned", Some(4), None, Some(ConnectionId(2)))
            .unwrap();
        registry.join(&id, participant(1, "a"), None).await.unwrap();
        assert_eq!(
            registry.get_room(&id).await.unwrap().owner,
            Some(PeerId::from("a"))
        );

        registry.join(&id, participant(2, "creator"), None).await.unwrap();
        assert_eq!(
            registry.get_room(&id).await.unwrap().owner,
            Some(PeerId::from("creator"))
        );

        registry.leave(&id, ConnectionId(2)).await.unwrap();
        assert_eq!(
            registry.get_room(&id).await.unwrap().owner,
            Some(PeerId::from("a"))
        );
    }

    #[tokio::test]
    async fn kick_requires_owner() {
        let registry = RoomRegistry::default();
        let id = registry
            .create_room("kick", Some(4), None, Some(ConnectionId(1)))
            .unwrap();
        registry.join(&id, participant(1, "owner"), None).await.unwrap();
        registry.join(&id, participant(2, "b"), None).await.unwrap();
        registry.join(&id, participant(3, "c"), None).await.unwrap();

        let err = registry
            .kick(&id, &PeerId::from("b"), ConnectionId(3))
            .await
            .unwrap_err();
        assert_eq!(err, CoordinatorError::Unauthorized);
        assert_eq!(registry.get_room(&id).await.unwrap().participants.len(), 3);

        let departure = registry
            .kick(&id, &PeerId::from("owner"), ConnectionId(3))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(departure.participant.connection, ConnectionId(3));
        assert_eq!(departure.room.participants.len(), 2);
        assert!(!departure.room_removed);
    }

    #[tokio::test]
    async fn kick_self_or_absent_peer_is_noop() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("noop", Some(4), None, None).unwrap();
        registry.join(&id, participant(1, "owner"), None).await.unwrap();

        let owner = PeerId::from("owner");
        assert!(registry
            .kick(&id, &owner, ConnectionId(1))
            .await
            .unwrap()
            .is_none());
        assert!(registry
            .kick(&id, &owner, ConnectionId(9))
            .await
            .unwrap()
            .is_none());
        assert_eq!(registry.get_room(&id).await.unwrap().participants.len(), 1);
    }

    #[tokio::test]
    async fn sweep_removes_only_unclaimed_rooms() {
        let registry = RoomRegistry::default();
        let idle = registry.create_room("idle", None, None, None).unwrap();
        let used = registry.create_room("used", None, None, None).unwrap();
        registry.join(&used, participant(1, "a"), None).await.unwrap();

        let removed = registry.sweep_unclaimed(Duration::ZERO).await;
        assert_eq!(removed, vec![idle]);
        assert_eq!(registry.room_count(), 1);
    }

    #[tokio::test]
    async fn join_after_removal_sees_room_not_found() {
        let registry = RoomRegistry::default();
        let id = registry.create_room("gone", Some(2), None, None).unwrap();
        registry.join(&id, participant(1, "a"), None).await.unwrap();
        registry.leave(&id, ConnectionId(1)).await.unwrap();

        let err = registry.join(&id, participant(2, "b"), None).await.unwrap_err();
        assert_eq!(err, CoordinatorError::RoomNotFound);
    }
}
