//! In-memory profile store
//!
//! Used when no DATABASE_URL is configured and throughout the tests. Nothing
//! survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::{ProfileStore, StoreError};
use crate::core::db::SessionRepository;
use crate::core::db::models::{
    Account, CreateAccount, CreateRating, CreateRoom, Rating, RoomParticipant, RoomRecord,
};

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    accounts: DashMap<Uuid, Account>,
    /// token hash -> (account, expiry)
    sessions: DashMap<String, (Uuid, DateTime<Utc>)>,
    rooms: DashMap<Uuid, RoomRecord>,
    participants: DashMap<Uuid, RoomParticipant>,
    ratings: DashMap<Uuid, Rating>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cookie session, as the account service would
    pub fn insert_session(&self, raw_token: &str, account_id: Uuid, ttl: Duration) {
        self.sessions.insert(
            SessionRepository::hash_token(raw_token),
            (account_id, Utc::now() + ttl),
        );
    }

    /// Open memberships of a room
    pub fn open_participants(&self, room_id: Uuid) -> Vec<RoomParticipant> {
        let mut open: Vec<RoomParticipant> = self
            .participants
            .iter()
            .filter(|p| p.room_id == room_id && p.left_at.is_none())
            .map(|p| p.value().clone())
            .collect();
        open.sort_by_key(|p| p.joined_at);
        open
    }

    pub fn ratings_for(&self, account_id: Uuid) -> Vec<Rating> {
        self.ratings
            .iter()
            .filter(|r| r.rated_account_id == account_id)
            .map(|r| r.value().clone())
            .collect()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn create_account(&self, account: CreateAccount) -> Result<Account, StoreError> {
        if !account.is_guest
            && self
                .accounts
                .iter()
                .any(|a| !a.is_guest && a.username == account.username)
        {
            return Err(StoreError::Conflict("username already exists".to_string()));
        }

        let id = account.id.unwrap_or_else(Uuid::new_v4);
        let created = Account {
            id,
            username: account.username,
            is_guest: account.is_guest,
            created_at: Utc::now(),
        };

        match self.accounts.entry(id) {
            Entry::Occupied(_) => {
                Err(StoreError::Conflict("account already exists".to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(created.clone());
                Ok(created)
            }
        }
    }

    async fn resolve_session(&self, raw_token: &str) -> Result<Option<Uuid>, StoreError> {
        let hash = SessionRepository::hash_token(raw_token);
        let Some((account_id, expires_at)) = self.sessions.get(&hash).map(|s| *s.value()) else {
            return Ok(None);
        };

        if expires_at <= Utc::now() {
            self.sessions.remove(&hash);
            return Ok(None);
        }
        Ok(Some(account_id))
    }

    async fn create_room(&self, room: CreateRoom) -> Result<RoomRecord, StoreError> {
        if !self.accounts.contains_key(&room.host_account_id) {
            return Err(StoreError::NotFound);
        }

        let record = RoomRecord {
            id: Uuid::new_v4(),
            host_account_id: room.host_account_id,
            title: room.title,
            genre: room.genre,
            capacity: room.capacity,
            is_active: true,
            created_at: Utc::now(),
            closed_at: None,
        };
        self.rooms.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_room(&self, id: Uuid) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.rooms.get(&id).map(|r| r.value().clone()))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        let mut rooms: Vec<RoomRecord> = self
            .rooms
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.value().clone())
            .collect();
        rooms.sort_by_key(|r| r.created_at);
        Ok(rooms)
    }

    async fn record_join(
        &self,
        room_id: Uuid,
        connection_id: Uuid,
        account_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        if !self.rooms.contains_key(&room_id) {
            return Err(StoreError::NotFound);
        }

        let participant = RoomParticipant {
            id: Uuid::new_v4(),
            room_id,
            connection_id,
            account_id,
            joined_at: Utc::now(),
            left_at: None,
        };
        self.participants.insert(participant.id, participant);
        Ok(())
    }

    async fn record_leave(&self, room_id: Uuid, connection_id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();
        for mut participant in self.participants.iter_mut() {
            if participant.room_id == room_id
                && participant.connection_id == connection_id
                && participant.left_at.is_none()
            {
                participant.left_at = Some(now);
            }
        }
        Ok(())
    }

    async fn close_room(&self, room_id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();
        {
            let mut room = self.rooms.get_mut(&room_id).ok_or(StoreError::NotFound)?;
            room.is_active = false;
            room.closed_at.get_or_insert(now);
        }

        for mut participant in self.participants.iter_mut() {
            if participant.room_id == room_id && participant.left_at.is_none() {
                participant.left_at = Some(now);
            }
        }
        Ok(())
    }

    async fn create_rating(&self, rating: CreateRating) -> Result<Rating, StoreError> {
        if !rating.is_valid() {
            return Err(StoreError::Invalid(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        if !self.accounts.contains_key(&rating.rated_account_id) {
            return Err(StoreError::NotFound);
        }
        if self.ratings.iter().any(|r| {
            r.session_id == rating.session_id && r.rated_account_id == rating.rated_account_id
        }) {
            return Err(StoreError::Conflict(
                "session partner already rated".to_string(),
            ));
        }

        let created = Rating {
            id: Uuid::new_v4(),
            rater_account_id: rating.rater_account_id,
            rated_account_id: rating.rated_account_id,
            session_id: rating.session_id,
            rating: rating.rating,
            created_at: Utc::now(),
        };
        self.ratings.insert(created.id, created.clone());
        Ok(created)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn member(store: &MemoryProfileStore, username: &str) -> Account {
        store
            .create_account(CreateAccount {
                id: None,
                username: username.to_string(),
                is_guest: false,
            })
            .await
            .unwrap()
    }

    // ========================================================================
    // Accounts & Sessions
    // ========================================================================

    #[tokio::test]
    async fn test_create_and_find_account() {
        let store = MemoryProfileStore::new();
        let account = member(&store, "river").await;

        assert_eq!(store.find_account(account.id).await.unwrap(), Some(account));
        assert!(store.find_account(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_member_usernames_are_unique() {
        let store = MemoryProfileStore::new();
        member(&store, "river").await;

        let duplicate = store
            .create_account(CreateAccount {
                id: None,
                username: "river".to_string(),
                is_guest: false,
            })
            .await;
        assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

        // Guests may share display names
        for _ in 0..2 {
            store
                .create_account(CreateAccount {
                    id: None,
                    username: "river".to_string(),
                    is_guest: true,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_resolve_session() {
        let store = MemoryProfileStore::new();
        let account = member(&store, "river").await;
        store.insert_session("cookie-live", account.id, Duration::hours(1));
        store.insert_session("cookie-stale", account.id, Duration::seconds(-1));

        assert_eq!(
            store.resolve_session("cookie-live").await.unwrap(),
            Some(account.id)
        );
        assert!(store.resolve_session("cookie-stale").await.unwrap().is_none());
        assert!(store.resolve_session("nope").await.unwrap().is_none());
    }

    // ========================================================================
    // Rooms
    // ========================================================================

    #[tokio::test]
    async fn test_room_membership_history() {
        let store = MemoryProfileStore::new();
        let host = member(&store, "host").await;
        let room = store
            .create_room(CreateRoom {
                host_account_id: host.id,
                title: "Grief Support".to_string(),
                genre: "sad".to_string(),
                capacity: 2,
            })
            .await
            .unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.record_join(room.id, a, Some(host.id)).await.unwrap();
        store.record_join(room.id, b, None).await.unwrap();
        store.record_leave(room.id, a).await.unwrap();
        assert_eq!(store.open_participants(room.id).len(), 1);

        store.close_room(room.id).await.unwrap();
        assert!(store.open_participants(room.id).is_empty());
        assert!(store.list_rooms().await.unwrap().is_empty());
        assert!(!store.get_room(room.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_room_requires_known_host() {
        let store = MemoryProfileStore::new();
        let result = store
            .create_room(CreateRoom {
                host_account_id: Uuid::new_v4(),
                title: "Orphan".to_string(),
                genre: "other".to_string(),
                capacity: 3,
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    // ========================================================================
    // Ratings
    // ========================================================================

    #[tokio::test]
    async fn test_create_rating() {
        let store = MemoryProfileStore::new();
        let rated = member(&store, "listener").await;

        let rating = store
            .create_rating(CreateRating {
                rater_account_id: None,
                rated_account_id: rated.id,
                session_id: Uuid::new_v4(),
                rating: 4,
            })
            .await
            .unwrap();
        assert_eq!(store.ratings_for(rated.id), vec![rating]);

        let invalid = store
            .create_rating(CreateRating {
                rater_account_id: None,
                rated_account_id: rated.id,
                session_id: Uuid::new_v4(),
                rating: 0,
            })
            .await;
        assert!(matches!(invalid, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_rating_once_per_session() {
        let store = MemoryProfileStore::new();
        let rated = member(&store, "listener").await;
        let session_id = Uuid::new_v4();
        let rate = |rating| CreateRating {
            rater_account_id: None,
            rated_account_id: rated.id,
            session_id,
            rating,
        };

        store.create_rating(rate(5)).await.unwrap();
        let repeat = store.create_rating(rate(1)).await;
        assert!(matches!(repeat, Err(StoreError::Conflict(_))));
        assert_eq!(store.ratings_for(rated.id).len(), 1);

        // A different session with the same partner is fine
        store
            .create_rating(CreateRating {
                session_id: Uuid::new_v4(),
                ..rate(3)
            })
            .await
            .unwrap();
        assert_eq!(store.ratings_for(rated.id).len(), 2);
    }
}
