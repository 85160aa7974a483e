//! Core services: configuration, persistence, identity and matchmaking

pub mod auth;
pub mod config;
pub mod db;
pub mod matchmaking;
pub mod store;
