//! Anonymous peer-support matchmaking
//!
//! Connections declare an intent (talk, listen, both, sponsor) and are paired
//! 1:1 by a fixed priority table, or gather in host-created topic rooms.
//!
//! Layout:
//! - `protocol` - wire events, DTOs and boundary validation
//! - `hub` - the single authority over sessions, pools and rooms
//! - `api` / `websocket` - HTTP and WebSocket surface around the hub

pub mod api;
pub mod auth;
pub mod error;
pub mod hub;
pub mod ledger;
pub mod mailbox;
pub mod matcher;
pub mod protocol;
pub mod queue;
pub mod rate_limiter;
pub mod registry;
pub mod room;
pub mod session;
pub mod websocket;

pub use api::{MatchmakingState, matchmaking_router};
pub use auth::Viewer;
pub use error::HubError;
pub use hub::Hub;
pub use protocol::*;
pub use websocket::ws_handler;
