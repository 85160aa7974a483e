//! Rating repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{CreateRating, Rating};

#[derive(Debug, thiserror::Error)]
pub enum RatingRepositoryError {
    #[error("Rating must be between 1 and 5")]
    OutOfRange,

    #[error("Rated account not found")]
    AccountNotFound,

    #[error("Session partner already rated")]
    AlreadyRated,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct RatingRepository {
    pool: PgPool,
}

impl RatingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: &CreateRating) -> Result<Rating, RatingRepositoryError> {
        if !data.is_valid() {
            return Err(RatingRepositoryError::OutOfRange);
        }

        let rating = sqlx::query_as::<_, Rating>(
            r#"
            INSERT INTO service_ratings (rater_account_id, rated_account_id, session_id, rating)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.rater_account_id)
        .bind(data.rated_account_id)
        .bind(data.session_id)
        .bind(data.rating)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                RatingRepositoryError::AccountNotFound
            }
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                RatingRepositoryError::AlreadyRated
            }
            _ => RatingRepositoryError::from(e),
        })?;

        Ok(rating)
    }

    /// Ratings received by an account, newest first
    pub async fn list_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Rating>, RatingRepositoryError> {
        let ratings = sqlx::query_as::<_, Rating>(
            r#"
            SELECT * FROM service_ratings
            WHERE rated_account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ratings)
    }
}
