//! Database repositories for Menti
//!
//! Repositories encapsulate data access for accounts, cookie sessions, rooms
//! and ratings. The Postgres profile store composes them.

pub mod account;
pub mod rating;
pub mod room;
pub mod session;

pub use account::{AccountRepository, AccountRepositoryError};
pub use rating::{RatingRepository, RatingRepositoryError};
pub use room::{RoomRepository, RoomRepositoryError};
pub use session::{SessionRepository, SessionRepositoryError};

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::core::db::pool::{DbConfig, create_pool_with_migrations};

    pub async fn create_test_pool() -> PgPool {
        let config = DbConfig::from_env().expect("DATABASE_URL must be set for tests");
        create_pool_with_migrations(&config)
            .await
            .expect("Failed to create test pool")
    }

    pub async fn insert_test_account(pool: &PgPool, is_guest: bool) -> Uuid {
        let account_id = Uuid::new_v4();
        sqlx::query("INSERT INTO accounts (id, username, is_guest) VALUES ($1, $2, $3)")
            .bind(account_id)
            .bind(format!("test_{}", &account_id.to_string()[..8]))
            .bind(is_guest)
            .execute(pool)
            .await
            .expect("Failed to create test account");
        account_id
    }

    pub async fn cleanup_test_account(pool: &PgPool, account_id: Uuid) {
        // Sessions, rooms and ratings go with the account (CASCADE)
        sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(account_id)
            .execute(pool)
            .await
            .expect("Failed to cleanup test account");
    }
}
