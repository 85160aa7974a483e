//! Connection registry
//!
//! Owns every `ConnectionSession`, indexed by connection id. An account may
//! have several live connections (tabs); lookups by account scan them all.

use std::collections::HashMap;

use super::protocol::{AccountId, ConnectionId, RoomId};
use super::session::ConnectionSession;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<ConnectionId, ConnectionSession>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, replacing any session with the same connection id
    pub fn insert(&mut self, session: ConnectionSession) {
        self.sessions.insert(session.connection_id, session);
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionSession> {
        self.sessions.remove(connection_id)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&ConnectionSession> {
        self.sessions.get(connection_id)
    }

    pub fn get_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut ConnectionSession> {
        self.sessions.get_mut(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.sessions.contains_key(connection_id)
    }

    /// A room seat held by some other connection of `account`
    pub fn seat_of_account(
        &self,
        account: &AccountId,
        except: &ConnectionId,
    ) -> Option<(ConnectionId, RoomId)> {
        self.sessions.values().find_map(|s| {
            let room_id = s.room_id?;
            (s.connection_id != *except && s.account_id.as_ref() == Some(account))
                .then_some((s.connection_id, room_id))
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionSession> {
        self.sessions.values()
    }
}
