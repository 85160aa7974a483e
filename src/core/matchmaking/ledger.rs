//! Record of recent 1:1 sessions
//!
//! Sessions are ephemeral in the hub; once a pair is torn down the partner
//! fields are cleared. Ratings arrive after that, so the ledger keeps who took
//! part in each session for a bounded number of recent sessions.

use std::collections::{HashMap, VecDeque};

use super::protocol::{AccountId, ConnectionId, SessionId};

/// Default number of sessions retained
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// One side of a recorded session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParticipant {
    pub connection_id: ConnectionId,
    pub account_id: Option<AccountId>,
}

#[derive(Debug)]
pub struct SessionLedger {
    capacity: usize,
    sessions: HashMap<SessionId, [SessionParticipant; 2]>,
    order: VecDeque<SessionId>,
}

impl SessionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sessions: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record a new session, evicting the oldest once over capacity
    pub fn record(&mut self, session_id: SessionId, participants: [SessionParticipant; 2]) {
        if self.sessions.insert(session_id, participants).is_none() {
            self.order.push_back(session_id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.sessions.remove(&oldest);
            }
        }
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&[SessionParticipant; 2]> {
        self.sessions.get(session_id)
    }

    /// The participant with `connection_id` in `session_id`
    pub fn participant(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Option<SessionParticipant> {
        self.sessions
            .get(session_id)?
            .iter()
            .find(|p| p.connection_id == *connection_id)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn participant() -> SessionParticipant {
        SessionParticipant {
            connection_id: Uuid::new_v4(),
            account_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn test_record_and_lookup() {
        let mut ledger = SessionLedger::default();
        let session_id = Uuid::new_v4();
        let a = participant();
        let b = participant();
        ledger.record(session_id, [a, b]);

        assert_eq!(ledger.participant(&session_id, &b.connection_id), Some(b));
        assert!(ledger.participant(&session_id, &Uuid::new_v4()).is_none());
        assert!(ledger.participant(&Uuid::new_v4(), &a.connection_id).is_none());
    }

    #[test]
    fn test_evicts_oldest() {
        let mut ledger = SessionLedger::new(2);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();
        ledger.record(first, [participant(), participant()]);
        ledger.record(second, [participant(), participant()]);
        ledger.record(third, [participant(), participant()]);

        assert_eq!(ledger.len(), 2);
        assert!(ledger.get(&first).is_none());
        assert!(ledger.get(&second).is_some());
        assert!(ledger.get(&third).is_some());
    }
}
