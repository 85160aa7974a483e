//! Account repository for database operations
//!
//! Accounts are created on first sight of a valid access token; credentials
//! themselves live with the account service, not here.

use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{Account, CreateAccount};

/// Account repository error types
#[derive(Debug, thiserror::Error)]
pub enum AccountRepositoryError {
    #[error("Account not found")]
    NotFound,

    #[error("Username already exists")]
    UsernameAlreadyExists,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Account repository for database operations
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    /// Create a new account repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an account
    pub async fn create(&self, dto: &CreateAccount) -> Result<Account, AccountRepositoryError> {
        // Guest names are display-only and may repeat
        if !dto.is_guest && self.find_by_username(&dto.username).await?.is_some() {
            return Err(AccountRepositoryError::UsernameAlreadyExists);
        }

        let id = dto.id.unwrap_or_else(Uuid::new_v4);

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, username, is_guest)
            VALUES ($1, $2, $3)
            RETURNING id, username, is_guest, created_at
            "#,
        )
        .bind(id)
        .bind(&dto.username)
        .bind(dto.is_guest)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.constraint() == Some("idx_accounts_username_member") =>
            {
                AccountRepositoryError::UsernameAlreadyExists
            }
            _ => AccountRepositoryError::from(e),
        })?;

        Ok(account)
    }

    /// Find an account by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AccountRepositoryError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, username, is_guest, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Find a member account by username
    pub async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, AccountRepositoryError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, username, is_guest, created_at
            FROM accounts
            WHERE username = $1 AND is_guest = FALSE
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Get an account by ID or fail
    pub async fn get(&self, id: Uuid) -> Result<Account, AccountRepositoryError> {
        self.find_by_id(id)
            .await?
            .ok_or(AccountRepositoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::repositories::test_support::*;

    #[test]
    fn test_account_repository_error_display() {
        assert_eq!(
            AccountRepositoryError::NotFound.to_string(),
            "Account not found"
        );
        assert_eq!(
            AccountRepositoryError::UsernameAlreadyExists.to_string(),
            "Username already exists"
        );
    }

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_with_fixed_id() {
        let pool = create_test_pool().await;
        let repo = AccountRepository::new(pool.clone());
        let id = Uuid::new_v4();

        let account = repo
            .create(&CreateAccount {
                id: Some(id),
                username: format!("member_{}", &id.to_string()[..8]),
                is_guest: false,
            })
            .await
            .unwrap();

        assert_eq!(account.id, id);
        assert!(!account.is_guest);
        assert_eq!(repo.get(id).await.unwrap(), account);

        cleanup_test_account(&pool, id).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_duplicate_member_username() {
        let pool = create_test_pool().await;
        let repo = AccountRepository::new(pool.clone());
        let username = format!("dup_{}", &Uuid::new_v4().to_string()[..8]);

        let first = repo
            .create(&CreateAccount {
                id: None,
                username: username.clone(),
                is_guest: false,
            })
            .await
            .unwrap();

        let second = repo
            .create(&CreateAccount {
                id: None,
                username,
                is_guest: false,
            })
            .await;
        assert!(matches!(
            second,
            Err(AccountRepositoryError::UsernameAlreadyExists)
        ));

        cleanup_test_account(&pool, first.id).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_find_missing_account() {
        let pool = create_test_pool().await;
        let repo = AccountRepository::new(pool);

        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(matches!(
            repo.get(Uuid::new_v4()).await,
            Err(AccountRepositoryError::NotFound)
        ));
    }
}
