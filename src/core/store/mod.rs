//! Profile store
//!
//! The durable collaborator of the matchmaking hub: accounts, cookie
//! sessions, room records with their membership history, and ratings. The hub
//! never calls it while holding its lock.
//!
//! Two implementations exist:
//! - `MemoryProfileStore` for development and tests
//! - `PgProfileStore` backed by the SQLx repositories

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::db::models::{Account, CreateAccount, CreateRating, CreateRoom, Rating, RoomRecord};

pub use memory::MemoryProfileStore;
pub use postgres::PgProfileStore;

/// Profile store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn create_account(&self, account: CreateAccount) -> Result<Account, StoreError>;

    /// Account behind a raw session cookie; expired or unknown tokens resolve to None
    async fn resolve_session(&self, raw_token: &str) -> Result<Option<Uuid>, StoreError>;

    async fn create_room(&self, room: CreateRoom) -> Result<RoomRecord, StoreError>;

    async fn get_room(&self, id: Uuid) -> Result<Option<RoomRecord>, StoreError>;

    /// Active rooms, oldest first
    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError>;

    async fn record_join(
        &self,
        room_id: Uuid,
        connection_id: Uuid,
        account_id: Option<Uuid>,
    ) -> Result<(), StoreError>;

    async fn record_leave(&self, room_id: Uuid, connection_id: Uuid) -> Result<(), StoreError>;

    /// Mark a room inactive and close its open memberships
    async fn close_room(&self, room_id: Uuid) -> Result<(), StoreError>;

    /// Fails with `Conflict` if this session's partner was already rated
    async fn create_rating(&self, rating: CreateRating) -> Result<Rating, StoreError>;

    /// Whether the backing storage answers
    async fn health_check(&self) -> Result<(), StoreError>;
}
