//! Menti - anonymous peer-support chat
//!
//! A WebSocket service that pairs people who want to talk with people who
//! want to listen, and hosts small topic rooms.

pub mod core;
