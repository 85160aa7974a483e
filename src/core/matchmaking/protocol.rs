//! WebSocket protocol messages and DTOs for matchmaking
//!
//! This module defines all event types exchanged between clients and the
//! matchmaking authority, the room snapshot DTO shared by the WebSocket and
//! REST surfaces, and boundary validation for inbound payloads.
//!
//! Frames are adjacently tagged JSON: `{"type": "join_queue", "payload": {"intent": "talk"}}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Type Aliases
// ============================================================================

/// Identifier of one live transport connection
pub type ConnectionId = Uuid;

/// Durable account identifier (resolved through the profile store)
pub type AccountId = Uuid;

/// Room identifier (UUID)
pub type RoomId = Uuid;

/// Identifier shared by both sides of a 1:1 session
pub type SessionId = Uuid;

// ============================================================================
// Limits
// ============================================================================

/// Maximum message length, in characters
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Room capacity bounds (inclusive)
pub const MIN_ROOM_CAPACITY: usize = 2;
pub const MAX_ROOM_CAPACITY: usize = 13;

/// Room title bounds (inclusive, after trimming)
pub const MIN_ROOM_TITLE_CHARS: usize = 3;
pub const MAX_ROOM_TITLE_CHARS: usize = 50;

/// Genres a room may be tagged with
pub const ROOM_GENRES: [&str; 6] = ["sad", "happy", "anxious", "lonely", "excited", "other"];

// ============================================================================
// Intent & Role
// ============================================================================

/// Declared conversational goal; the matching key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Talk,
    Listen,
    Both,
    Sponsor,
}

impl Intent {
    pub const ALL: [Intent; 4] = [Intent::Talk, Intent::Listen, Intent::Both, Intent::Sponsor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Talk => "talk",
            Intent::Listen => "listen",
            Intent::Both => "both",
            Intent::Sponsor => "sponsor",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label a connection carries within one specific match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Talker,
    Listener,
    Peer,
    Sponsor,
}

impl Role {
    /// The role the other side of a match takes when this side holds `self`
    pub fn inverse(&self) -> Role {
        match self {
            Role::Talker => Role::Listener,
            Role::Listener => Role::Talker,
            Role::Peer => Role::Peer,
            Role::Sponsor => Role::Talker,
        }
    }
}

/// Server-side connection state, as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Idle,
    Waiting,
    Matched,
    Active,
}

// ============================================================================
// Room DTO
// ============================================================================

/// Room information broadcast to clients and returned by the REST API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub title: String,
    pub genre: String,
    pub capacity: usize,
    pub host_account_id: AccountId,
    /// Connection ids of current members, in join order
    pub participants: Vec<ConnectionId>,
}

// ============================================================================
// WebSocket Protocol Messages
// ============================================================================

/// Client-to-server events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Enter the matching queue with a declared intent
    JoinQueue { intent: Intent },

    /// Chat content for the current partner or room
    Message { content: String },

    /// Leave whatever session/queue/room this connection is in
    LeaveSession,

    /// Host a new topic room (authenticated accounts only)
    CreateRoom {
        title: String,
        genre: String,
        capacity: usize,
    },

    /// Join an existing topic room
    JoinRoom { room_id: RoomId },

    /// Leave the current room only
    LeaveRoom,

    /// Request the current room list
    GetRooms,

    /// Queue as `talk`, which prefers waiting sponsors first
    EmergencySupport,

    /// Keepalive
    Ping,
}

/// Server-to-client events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Sent once after the upgrade completes
    Connected {
        connection_id: ConnectionId,
        display_name: String,
        authenticated: bool,
    },

    /// Server placed the connection in a new state (used for WAITING)
    StateUpdate { state: ConnectionState },

    /// A 1:1 partner was found
    MatchFound {
        session_id: SessionId,
        role: Role,
        partner_intent: Intent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partner_connection_id: Option<ConnectionId>,
    },

    /// Relayed chat message
    Message {
        id: Uuid,
        content: String,
        sender_id: ConnectionId,
        /// Unix milliseconds, server clock
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_name: Option<String>,
    },

    /// The 1:1 partner left or lost its transport
    PartnerDisconnected,

    /// This connection is now a member of a room
    RoomJoined { room_id: RoomId, room: RoomSnapshot },

    /// Membership of the current room changed
    RoomUpdate { room: RoomSnapshot },

    /// Full room list
    RoomList { rooms: Vec<RoomSnapshot> },

    /// Error scoped to this connection
    Error { code: WsErrorCode, message: String },

    /// Keepalive answer
    Pong,
}

/// WebSocket error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsErrorCode {
    InvalidMessage,
    RoomNotFound,
    RoomFull,
    Unauthorized,
    RateLimited,
    Superseded,
    InternalError,
}

impl ServerEvent {
    /// Create an error event
    pub fn error(code: WsErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Event name as it appears in the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::StateUpdate { .. } => "state_update",
            Self::MatchFound { .. } => "match_found",
            Self::Message { .. } => "message",
            Self::PartnerDisconnected => "partner_disconnected",
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomUpdate { .. } => "room_update",
            Self::RoomList { .. } => "room_list",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
        }
    }
}

// ============================================================================
// Boundary Validation
// ============================================================================

/// Reasons an inbound payload is rejected before it reaches the state machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Malformed event: {0}")]
    Malformed(String),

    #[error("Message must be between 1 and 2000 characters")]
    ContentLength,

    #[error("Room title must be between 3 and 50 characters")]
    TitleLength,

    #[error("Unknown room genre: {0}")]
    UnknownGenre(String),

    #[error("Room capacity must be between 2 and 13")]
    Capacity,
}

impl ClientEvent {
    /// Parse a text frame into an event and validate its payload
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let event: ClientEvent =
            serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Validate payload bounds
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Message { content } => validate_content(content),
            Self::CreateRoom {
                title,
                genre,
                capacity,
            } => {
                validate_title(title)?;
                validate_genre(genre)?;
                validate_capacity(*capacity)
            }
            _ => Ok(()),
        }
    }
}

pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    let chars = content.chars().count();
    if chars == 0 || chars > MAX_MESSAGE_CHARS {
        return Err(ValidationError::ContentLength);
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    let chars = title.trim().chars().count();
    if !(MIN_ROOM_TITLE_CHARS..=MAX_ROOM_TITLE_CHARS).contains(&chars) {
        return Err(ValidationError::TitleLength);
    }
    Ok(())
}

pub fn validate_genre(genre: &str) -> Result<(), ValidationError> {
    if ROOM_GENRES.contains(&genre) {
        Ok(())
    } else {
        Err(ValidationError::UnknownGenre(genre.to_string()))
    }
}

pub fn validate_capacity(capacity: usize) -> Result<(), ValidationError> {
    if (MIN_ROOM_CAPACITY..=MAX_ROOM_CAPACITY).contains(&capacity) {
        Ok(())
    } else {
        Err(ValidationError::Capacity)
    }
}

// ============================================================================
// REST API DTOs
// ============================================================================

/// Request to rate the partner of a finished 1:1 session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRatingRequest {
    pub rating: i32,
    pub session_id: SessionId,
    pub partner_connection_id: ConnectionId,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: ApiErrorCode,
}

/// API error codes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    NotFound,
    BadRequest,
    Unauthorized,
    Conflict,
    InternalError,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: ApiErrorCode::NotFound,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: ApiErrorCode::BadRequest,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            error: "Authentication required".to_string(),
            code: ApiErrorCode::Unauthorized,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: ApiErrorCode::Conflict,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: ApiErrorCode::InternalError,
        }
    }
}
