//! Session repository for cookie credentials
//!
//! Sessions are issued by the account service; the matchmaking server only
//! resolves them. Tokens are stored as SHA-256 hashes.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::Session;

/// Default session duration (24 hours)
const DEFAULT_SESSION_DURATION_HOURS: i64 = 24;

/// Session repository error types
#[derive(Debug, thiserror::Error)]
pub enum SessionRepositoryError {
    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Session repository for database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Hash a token using SHA-256
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        let result = hasher.finalize();
        hex::encode(result)
    }

    /// Store a session for `raw_token`
    pub async fn create(
        &self,
        account_id: Uuid,
        raw_token: &str,
        duration_hours: Option<i64>,
    ) -> Result<Session, SessionRepositoryError> {
        let token_hash = Self::hash_token(raw_token);
        let duration = duration_hours.unwrap_or(DEFAULT_SESSION_DURATION_HOURS);
        let expires_at = Utc::now() + Duration::hours(duration);

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (account_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, account_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(account_id)
        .bind(&token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Find a session by raw token (will be hashed for lookup)
    pub async fn find_by_token(
        &self,
        raw_token: &str,
    ) -> Result<Option<Session>, SessionRepositoryError> {
        let token_hash = Self::hash_token(raw_token);

        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, account_id, token_hash, expires_at, created_at
            FROM sessions
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Validate a session token and return the session if valid
    /// Returns None if token not found, Err if expired
    pub async fn validate_token(
        &self,
        raw_token: &str,
    ) -> Result<Option<Session>, SessionRepositoryError> {
        let session = match self.find_by_token(raw_token).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            // Clean up expired session
            self.delete(session.id).await?;
            return Err(SessionRepositoryError::Expired);
        }

        Ok(Some(session))
    }

    /// Delete a session by ID
    pub async fn delete(&self, id: Uuid) -> Result<bool, SessionRepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clean up expired sessions
    pub async fn cleanup_expired(&self) -> Result<u64, SessionRepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
