//! Room management for group sessions
//!
//! This module owns the set of host-created topic rooms:
//! - Room creation with bounded capacity
//! - Idempotent membership joins, capacity enforcement
//! - Automatic deletion when the last participant leaves
//! - Participant rebinding when an account reconnects

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::protocol::*;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("Room is full")]
    Full,

    #[error("Room capacity must be between 2 and 13")]
    InvalidCapacity,

    #[error("Room with this ID already exists")]
    AlreadyExists,
}

// ============================================================================
// Room
// ============================================================================

/// A host-created topic room
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub host_account_id: AccountId,
    pub title: String,
    pub genre: String,
    pub capacity: usize,
    pub created_at: DateTime<Utc>,
    /// Members in join order
    participants: Vec<ConnectionId>,
}

impl Room {
    pub fn new(
        id: RoomId,
        host_account_id: AccountId,
        title: impl Into<String>,
        genre: impl Into<String>,
        capacity: usize,
    ) -> Result<Self, RoomError> {
        if !(MIN_ROOM_CAPACITY..=MAX_ROOM_CAPACITY).contains(&capacity) {
            return Err(RoomError::InvalidCapacity);
        }

        Ok(Self {
            id,
            host_account_id,
            title: title.into(),
            genre: genre.into(),
            capacity,
            created_at: Utc::now(),
            participants: Vec::new(),
        })
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn has_participant(&self, connection_id: &ConnectionId) -> bool {
        self.participants.contains(connection_id)
    }

    pub fn participants(&self) -> &[ConnectionId] {
        &self.participants
    }

    pub fn to_snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id,
            title: self.title.clone(),
            genre: self.genre.clone(),
            capacity: self.capacity,
            host_account_id: self.host_account_id,
            participants: self.participants.clone(),
        }
    }
}

// ============================================================================
// Room Manager
// ============================================================================

/// Result of a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

/// Result of a leave
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The connection was not a member (or the room is gone)
    NotMember,
    /// Membership removed; the room still has members
    Left(RoomSnapshot),
    /// Membership removed and the room was deleted
    Deleted,
}

#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, empty room
    pub fn insert(&mut self, room: Room) -> Result<&Room, RoomError> {
        if self.rooms.contains_key(&room.id) {
            return Err(RoomError::AlreadyExists);
        }
        let id = room.id;
        Ok(self.rooms.entry(id).or_insert(room))
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        self.rooms.get(room_id).map(Room::to_snapshot)
    }

    /// Add a member. Joining a room one already belongs to succeeds without change.
    pub fn join(
        &mut self,
        room_id: &RoomId,
        connection_id: ConnectionId,
    ) -> Result<JoinOutcome, RoomError> {
        let room = self.rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;

        if room.has_participant(&connection_id) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if room.is_full() {
            return Err(RoomError::Full);
        }

        room.participants.push(connection_id);
        Ok(JoinOutcome::Joined)
    }

    /// Remove a member; delete the room once it is empty
    pub fn leave(&mut self, room_id: &RoomId, connection_id: &ConnectionId) -> LeaveOutcome {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return LeaveOutcome::NotMember;
        };
        let Some(index) = room.participants.iter().position(|id| id == connection_id) else {
            return LeaveOutcome::NotMember;
        };

        room.participants.remove(index);

        if room.participants.is_empty() {
            self.rooms.remove(room_id);
            LeaveOutcome::Deleted
        } else {
            LeaveOutcome::Left(room.to_snapshot())
        }
    }

    /// Swap a stale participant for its replacement, keeping its place
    pub fn rebind(&mut self, room_id: &RoomId, stale: &ConnectionId, fresh: ConnectionId) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        match room.participants.iter().position(|id| id == stale) {
            Some(index) => {
                room.participants[index] = fresh;
                true
            }
            None => false,
        }
    }

    /// Remove a room regardless of membership
    pub fn remove(&mut self, room_id: &RoomId) -> Option<Room> {
        self.rooms.remove(room_id)
    }

    /// All rooms, oldest first
    pub fn list(&self) -> Vec<RoomSnapshot> {
        let mut rooms: Vec<&Room> = self.rooms.values().collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rooms.into_iter().map(Room::to_snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn create_test_room(manager: &mut RoomManager, capacity: usize) -> RoomId {
        let room = Room::new(Uuid::new_v4(), Uuid::new_v4(), "Grief Support", "sad", capacity)
            .unwrap();
        manager.insert(room).unwrap().id
    }

    #[test]
    fn test_room_capacity_bounds() {
        assert_eq!(
            Room::new(Uuid::new_v4(), Uuid::new_v4(), "t", "sad", 1).unwrap_err(),
            RoomError::InvalidCapacity
        );
        assert_eq!(
            Room::new(Uuid::new_v4(), Uuid::new_v4(), "t", "sad", 14).unwrap_err(),
            RoomError::InvalidCapacity
        );
        assert!(Room::new(Uuid::new_v4(), Uuid::new_v4(), "t", "sad", 13).is_ok());
    }

    #[test]
    fn test_join_until_full() {
        let mut manager = RoomManager::new();
        let room_id = create_test_room(&mut manager, 2);

        assert_eq!(manager.join(&room_id, Uuid::new_v4()), Ok(JoinOutcome::Joined));
        assert_eq!(manager.join(&room_id, Uuid::new_v4()), Ok(JoinOutcome::Joined));
        assert_eq!(manager.join(&room_id, Uuid::new_v4()), Err(RoomError::Full));
        assert_eq!(manager.get(&room_id).unwrap().participant_count(), 2);
    }

    #[test]
    fn test_join_is_idempotent_even_when_full() {
        let mut manager = RoomManager::new();
        let room_id = create_test_room(&mut manager, 2);
        let member = Uuid::new_v4();

        manager.join(&room_id, member).unwrap();
        manager.join(&room_id, Uuid::new_v4()).unwrap();

        assert_eq!(manager.join(&room_id, member), Ok(JoinOutcome::AlreadyMember));
        assert_eq!(manager.get(&room_id).unwrap().participant_count(), 2);
    }

    #[test]
    fn test_join_missing_room() {
        let mut manager = RoomManager::new();
        assert_eq!(
            manager.join(&Uuid::new_v4(), Uuid::new_v4()),
            Err(RoomError::NotFound)
        );
    }

    #[test]
    fn test_last_leave_deletes_room() {
        let mut manager = RoomManager::new();
        let room_id = create_test_room(&mut manager, 3);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        manager.join(&room_id, a).unwrap();
        manager.join(&room_id, b).unwrap();

        match manager.leave(&room_id, &a) {
            LeaveOutcome::Left(snapshot) => assert_eq!(snapshot.participants, vec![b]),
            other => panic!("Expected Left, got {:?}", other),
        }
        assert_eq!(manager.leave(&room_id, &b), LeaveOutcome::Deleted);
        assert!(manager.is_empty());
        assert_eq!(manager.leave(&room_id, &b), LeaveOutcome::NotMember);
    }

    #[test]
    fn test_rebind_keeps_position() {
        let mut manager = RoomManager::new();
        let room_id = create_test_room(&mut manager, 3);
        let stale = Uuid::new_v4();
        let other = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        manager.join(&room_id, stale).unwrap();
        manager.join(&room_id, other).unwrap();

        assert!(manager.rebind(&room_id, &stale, fresh));
        assert_eq!(
            manager.get(&room_id).unwrap().participants(),
            &[fresh, other]
        );
        assert!(!manager.rebind(&room_id, &stale, fresh));
    }

    #[test]
    fn test_insert_duplicate_id() {
        let mut manager = RoomManager::new();
        let id = Uuid::new_v4();
        let host = Uuid::new_v4();
        manager
            .insert(Room::new(id, host, "First room", "happy", 4).unwrap())
            .unwrap();
        let result = manager.insert(Room::new(id, host, "Second room", "happy", 4).unwrap());
        assert!(matches!(result, Err(RoomError::AlreadyExists)));
    }

    #[test]
    fn test_list_snapshots() {
        let mut manager = RoomManager::new();
        let first = create_test_room(&mut manager, 4);
        let second = create_test_room(&mut manager, 4);

        let ids: Vec<RoomId> = manager.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first));
        assert!(ids.contains(&second));
    }
}
