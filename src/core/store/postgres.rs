//! Postgres-backed profile store composed from the SQLx repositories

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ProfileStore, StoreError};
use crate::core::db::models::{Account, CreateAccount, CreateRating, CreateRoom, Rating, RoomRecord};
use crate::core::db::pool::health_check;
use crate::core::db::{
    AccountRepository, AccountRepositoryError, RatingRepository, RatingRepositoryError,
    RoomRepository, RoomRepositoryError, SessionRepository, SessionRepositoryError,
};

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
    accounts: AccountRepository,
    sessions: SessionRepository,
    rooms: RoomRepository,
    ratings: RatingRepository,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            accounts: AccountRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            rooms: RoomRepository::new(pool.clone()),
            ratings: RatingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Drop expired cookie sessions
    pub async fn purge_expired_sessions(&self) -> Result<u64, StoreError> {
        Ok(self.sessions.cleanup_expired().await?)
    }
}

// ============================================================================
// Error mapping
// ============================================================================

impl From<AccountRepositoryError> for StoreError {
    fn from(err: AccountRepositoryError) -> Self {
        match err {
            AccountRepositoryError::NotFound => StoreError::NotFound,
            AccountRepositoryError::UsernameAlreadyExists => StoreError::Conflict(err.to_string()),
            AccountRepositoryError::DatabaseError(e) => StoreError::Database(e.to_string()),
        }
    }
}

impl From<SessionRepositoryError> for StoreError {
    fn from(err: SessionRepositoryError) -> Self {
        match err {
            SessionRepositoryError::NotFound | SessionRepositoryError::Expired => {
                StoreError::NotFound
            }
            SessionRepositoryError::DatabaseError(e) => StoreError::Database(e.to_string()),
        }
    }
}

impl From<RoomRepositoryError> for StoreError {
    fn from(err: RoomRepositoryError) -> Self {
        match err {
            RoomRepositoryError::NotFound | RoomRepositoryError::HostNotFound => {
                StoreError::NotFound
            }
            RoomRepositoryError::DatabaseError(e) => StoreError::Database(e.to_string()),
        }
    }
}

impl From<RatingRepositoryError> for StoreError {
    fn from(err: RatingRepositoryError) -> Self {
        match err {
            RatingRepositoryError::OutOfRange => StoreError::Invalid(err.to_string()),
            RatingRepositoryError::AccountNotFound => StoreError::NotFound,
            RatingRepositoryError::AlreadyRated => StoreError::Conflict(err.to_string()),
            RatingRepositoryError::DatabaseError(e) => StoreError::Database(e.to_string()),
        }
    }
}

// ============================================================================
// ProfileStore
// ============================================================================

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.find_by_id(id).await?)
    }

    async fn create_account(&self, account: CreateAccount) -> Result<Account, StoreError> {
        Ok(self.accounts.create(&account).await?)
    }

    async fn resolve_session(&self, raw_token: &str) -> Result<Option<Uuid>, StoreError> {
        match self.sessions.validate_token(raw_token).await {
            Ok(session) => Ok(session.map(|s| s.account_id)),
            Err(SessionRepositoryError::Expired) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_room(&self, room: CreateRoom) -> Result<RoomRecord, StoreError> {
        Ok(self.rooms.create(&room).await?)
    }

    async fn get_room(&self, id: Uuid) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.rooms.find_by_id(id).await?)
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        Ok(self.rooms.list_active().await?)
    }

    async fn record_join(
        &self,
        room_id: Uuid,
        connection_id: Uuid,
        account_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.rooms
            .add_participant(room_id, connection_id, account_id)
            .await?;
        Ok(())
    }

    async fn record_leave(&self, room_id: Uuid, connection_id: Uuid) -> Result<(), StoreError> {
        self.rooms.mark_left(room_id, connection_id).await?;
        Ok(())
    }

    async fn close_room(&self, room_id: Uuid) -> Result<(), StoreError> {
        Ok(self.rooms.close(room_id).await?)
    }

    async fn create_rating(&self, rating: CreateRating) -> Result<Rating, StoreError> {
        Ok(self.ratings.create(&rating).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        health_check(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}
