//! Errors raised while the hub processes one inbound event
//!
//! Every error is scoped to the connection that sent the event. Some are
//! surfaced to that connection as an `error` event; state conflicts are
//! swallowed so duplicate or late client events are harmless.

use super::protocol::{ConnectionState, ServerEvent, ValidationError, WsErrorCode};
use super::room::RoomError;
use crate::core::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Event not allowed while {state:?}")]
    StateConflict { state: ConnectionState },

    #[error("Unknown connection")]
    UnknownConnection,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Only signed-in accounts can host rooms")]
    Permission,

    #[error("Profile store error: {0}")]
    Store(#[from] StoreError),
}

impl From<RoomError> for HubError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::NotFound => HubError::RoomNotFound,
            RoomError::Full => HubError::RoomFull,
            RoomError::InvalidCapacity => HubError::Validation(ValidationError::Capacity),
            RoomError::AlreadyExists => {
                HubError::Store(StoreError::Conflict("room already exists".to_string()))
            }
        }
    }
}

impl HubError {
    /// Event to send back to the originating connection, if any
    pub fn to_event(&self) -> Option<ServerEvent> {
        let code = match self {
            HubError::StateConflict { .. } | HubError::UnknownConnection => return None,
            HubError::Validation(_) => WsErrorCode::InvalidMessage,
            HubError::RoomNotFound => WsErrorCode::RoomNotFound,
            HubError::RoomFull => WsErrorCode::RoomFull,
            HubError::Permission => WsErrorCode::Unauthorized,
            HubError::Store(_) => {
                return Some(ServerEvent::error(
                    WsErrorCode::InternalError,
                    "Something went wrong, please try again",
                ));
            }
        };
        Some(ServerEvent::error(code, self.to_string()))
    }

    /// Whether this error is expected client noise rather than a fault
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            HubError::StateConflict { .. } | HubError::UnknownConnection
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conflict_is_silent() {
        let err = HubError::StateConflict {
            state: ConnectionState::Active,
        };
        assert!(err.to_event().is_none());
        assert!(err.is_benign());
    }

    #[test]
    fn test_room_full_is_surfaced() {
        match HubError::RoomFull.to_event() {
            Some(ServerEvent::Error { code, message }) => {
                assert_eq!(code, WsErrorCode::RoomFull);
                assert!(message.contains("full"));
            }
            other => panic!("Expected error event, got {:?}", other),
        }
    }

    #[test]
    fn test_store_error_hides_details() {
        let err = HubError::Store(StoreError::Database("connection refused".to_string()));
        match err.to_event() {
            Some(ServerEvent::Error { code, message }) => {
                assert_eq!(code, WsErrorCode::InternalError);
                assert!(!message.contains("connection refused"));
            }
            other => panic!("Expected error event, got {:?}", other),
        }
    }

    #[test]
    fn test_room_error_conversion() {
        assert!(matches!(
            HubError::from(RoomError::NotFound),
            HubError::RoomNotFound
        ));
        assert!(matches!(HubError::from(RoomError::Full), HubError::RoomFull));
        assert!(matches!(
            HubError::from(RoomError::InvalidCapacity),
            HubError::Validation(ValidationError::Capacity)
        ));
    }
}
