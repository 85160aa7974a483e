//! Authentication module for Menti
//!
//! Credentials are issued elsewhere; this module only validates HS256 access
//! tokens presented on connect.

pub mod jwt;

pub use jwt::{Claims, JwtConfig, JwtError, JwtService};
