//! Database models for Menti
//!
//! This module defines the entity structs that map to PostgreSQL tables. The
//! in-memory profile store uses the same structs, so they carry no sqlx-only
//! state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Account Model
// ============================================================================

/// A durable identity: registered member or guest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
}

/// Account data for creation
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccount {
    /// Fixed id (taken from an access token subject); generated when absent
    pub id: Option<Uuid>,
    pub username: String,
    pub is_guest: bool,
}

// ============================================================================
// Session Model
// ============================================================================

/// Cookie session issued by the account service
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

// ============================================================================
// Room Model
// ============================================================================

/// Durable record of a host-created room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub id: Uuid,
    pub host_account_id: Uuid,
    pub title: String,
    pub genre: String,
    pub capacity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Room data for creation
#[derive(Debug, Clone)]
pub struct CreateRoom {
    pub host_account_id: Uuid,
    pub title: String,
    pub genre: String,
    pub capacity: i32,
}

/// One membership interval of a connection in a room
#[derive(Debug, Clone, FromRow)]
pub struct RoomParticipant {
    pub id: Uuid,
    pub room_id: Uuid,
    pub connection_id: Uuid,
    pub account_id: Option<Uuid>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Rating Model
// ============================================================================

/// Post-session rating of a partner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: Uuid,
    pub rater_account_id: Option<Uuid>,
    pub rated_account_id: Uuid,
    pub session_id: Uuid,
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

/// Rating data for creation
#[derive(Debug, Clone)]
pub struct CreateRating {
    pub rater_account_id: Option<Uuid>,
    pub rated_account_id: Uuid,
    pub session_id: Uuid,
    pub rating: i32,
}

/// Lowest accepted rating
pub const MIN_RATING: i32 = 1;
/// Highest accepted rating
pub const MAX_RATING: i32 = 5;

impl CreateRating {
    pub fn is_valid(&self) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&self.rating)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_account_serializes_camel_case() {
        let account = Account {
            id: Uuid::new_v4(),
            username: "river".to_string(),
            is_guest: true,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["isGuest"], true);
        assert_eq!(json["username"], "river");
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            token_hash: "hash".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            created_at: Utc::now(),
        };
        assert!(!session.is_expired());

        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(session.is_expired());
    }

    #[test]
    fn test_rating_bounds() {
        let mut rating = CreateRating {
            rater_account_id: None,
            rated_account_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            rating: MIN_RATING,
        };
        assert!(rating.is_valid());

        rating.rating = MAX_RATING;
        assert!(rating.is_valid());

        rating.rating = 0;
        assert!(!rating.is_valid());

        rating.rating = 6;
        assert!(!rating.is_valid());
    }
}
