//! Per-connection session record
//!
//! One `ConnectionSession` exists for every live connection. Cross references
//! (`partner`, `room_id`) are plain identifiers resolved through the registry
//! and the room table on demand.

use super::protocol::{AccountId, ConnectionId, ConnectionState, Intent, RoomId, SessionId};

/// Session record for one live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSession {
    pub connection_id: ConnectionId,
    /// Declared intent while queued or paired
    pub intent: Option<Intent>,
    pub state: ConnectionState,
    /// Counterpart of a 1:1 session
    pub partner: Option<ConnectionId>,
    /// Shared by both sides of a 1:1 session
    pub session_id: Option<SessionId>,
    /// Room this connection participates in
    pub room_id: Option<RoomId>,
    /// Durable account, if the connection carried a valid credential
    pub account_id: Option<AccountId>,
    /// Whether the account may host rooms (non-guest)
    pub authenticated: bool,
    pub display_name: String,
}

impl ConnectionSession {
    /// Create an IDLE session for a freshly accepted connection
    pub fn new(connection_id: ConnectionId, display_name: impl Into<String>) -> Self {
        Self {
            connection_id,
            intent: None,
            state: ConnectionState::Idle,
            partner: None,
            session_id: None,
            room_id: None,
            account_id: None,
            authenticated: false,
            display_name: display_name.into(),
        }
    }

    /// Attach a durable account
    pub fn with_account(mut self, account_id: AccountId, authenticated: bool) -> Self {
        self.account_id = Some(account_id);
        self.authenticated = authenticated;
        self
    }

    pub fn is_idle(&self) -> bool {
        self.state == ConnectionState::Idle
    }

    /// MATCHED or ACTIVE with a 1:1 partner
    pub fn is_paired(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Matched | ConnectionState::Active
        ) && self.partner.is_some()
    }

    /// Drop every conversational field and return to IDLE
    pub fn reset(&mut self) {
        self.state = ConnectionState::Idle;
        self.intent = None;
        self.partner = None;
        self.session_id = None;
        self.room_id = None;
    }
}
