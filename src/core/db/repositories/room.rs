//! Room repository
//!
//! Provides database operations for:
//! - Creating and closing host-created rooms
//! - Listing active rooms
//! - Recording membership intervals of connections

use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{CreateRoom, RoomParticipant, RoomRecord};

/// Errors that can occur in room operations
#[derive(Debug, thiserror::Error)]
pub enum RoomRepositoryError {
    #[error("Room not found")]
    NotFound,

    #[error("Host account not found")]
    HostNotFound,

    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RoomRepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            _ => Self::DatabaseError(err),
        }
    }
}

/// Repository for room operations
#[derive(Clone)]
pub struct RoomRepository {
    pool: PgPool,
}

impl RoomRepository {
    /// Create a new room repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new active room
    pub async fn create(&self, data: &CreateRoom) -> Result<RoomRecord, RoomRepositoryError> {
        let room = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO rooms (host_account_id, title, genre, capacity)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.host_account_id)
        .bind(&data.title)
        .bind(&data.genre)
        .bind(data.capacity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                RoomRepositoryError::HostNotFound
            }
            _ => RoomRepositoryError::from(e),
        })?;

        Ok(room)
    }

    /// Find a room by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RoomRecord>, RoomRepositoryError> {
        let room = sqlx::query_as::<_, RoomRecord>("SELECT * FROM rooms WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(room)
    }

    /// All active rooms, oldest first
    pub async fn list_active(&self) -> Result<Vec<RoomRecord>, RoomRepositoryError> {
        let rooms = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT * FROM rooms
            WHERE is_active = TRUE
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rooms)
    }

    /// Close a room and any membership still open in it
    pub async fn close(&self, id: Uuid) -> Result<(), RoomRepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE room_participants
            SET left_at = NOW()
            WHERE room_id = $1 AND left_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE rooms
            SET is_active = FALSE, closed_at = COALESCE(closed_at, NOW())
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RoomRepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    /// Open a membership interval
    pub async fn add_participant(
        &self,
        room_id: Uuid,
        connection_id: Uuid,
        account_id: Option<Uuid>,
    ) -> Result<RoomParticipant, RoomRepositoryError> {
        let participant = sqlx::query_as::<_, RoomParticipant>(
            r#"
            INSERT INTO room_participants (room_id, connection_id, account_id)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(room_id)
        .bind(connection_id)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(participant)
    }

    /// Close the open membership interval of a connection
    pub async fn mark_left(
        &self,
        room_id: Uuid,
        connection_id: Uuid,
    ) -> Result<bool, RoomRepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE room_participants
            SET left_at = NOW()
            WHERE room_id = $1 AND connection_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(room_id)
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Open memberships of a room
    pub async fn open_participants(
        &self,
        room_id: Uuid,
    ) -> Result<Vec<RoomParticipant>, RoomRepositoryError> {
        let participants = sqlx::query_as::<_, RoomParticipant>(
            r#"
            SELECT * FROM room_participants
            WHERE room_id = $1 AND left_at IS NULL
            ORDER BY joined_at ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::repositories::test_support::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            RoomRepositoryError::from(sqlx::Error::RowNotFound),
            RoomRepositoryError::NotFound
        ));
    }

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_room_lifecycle() {
        let pool = create_test_pool().await;
        let host = insert_test_account(&pool, false).await;
        let repo = RoomRepository::new(pool.clone());

        let room = repo
            .create(&CreateRoom {
                host_account_id: host,
                title: "Grief Support".to_string(),
                genre: "sad".to_string(),
                capacity: 2,
            })
            .await
            .unwrap();
        assert!(room.is_active);
        assert!(repo.list_active().await.unwrap().iter().any(|r| r.id == room.id));

        let connection = Uuid::new_v4();
        repo.add_participant(room.id, connection, Some(host))
            .await
            .unwrap();
        assert_eq!(repo.open_participants(room.id).await.unwrap().len(), 1);

        assert!(repo.mark_left(room.id, connection).await.unwrap());
        assert!(!repo.mark_left(room.id, connection).await.unwrap());

        repo.close(room.id).await.unwrap();
        let closed = repo.find_by_id(room.id).await.unwrap().unwrap();
        assert!(!closed.is_active);
        assert!(closed.closed_at.is_some());

        cleanup_test_account(&pool, host).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_close_missing_room() {
        let pool = create_test_pool().await;
        let repo = RoomRepository::new(pool);

        assert!(matches!(
            repo.close(Uuid::new_v4()).await,
            Err(RoomRepositoryError::NotFound)
        ));
    }
}
