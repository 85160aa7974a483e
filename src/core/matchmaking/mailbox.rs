//! Outbound delivery
//!
//! The hub never performs I/O. Each command yields `Effects`: addressed
//! envelopes plus durable projections. Envelopes are handed to per-connection
//! channels here, after the hub lock has been released.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::protocol::{AccountId, ConnectionId, RoomId, ServerEvent};

/// One outbound event for one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: ConnectionId,
    pub event: ServerEvent,
}

/// Room membership change to mirror into the profile store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomProjection {
    Joined {
        room_id: RoomId,
        connection_id: ConnectionId,
        account_id: Option<AccountId>,
    },
    Left {
        room_id: RoomId,
        connection_id: ConnectionId,
    },
    Closed {
        room_id: RoomId,
    },
}

/// Everything one hub command produced, in production order
#[derive(Debug, Default)]
pub struct Effects {
    pub envelopes: Vec<Envelope>,
    pub projections: Vec<RoomProjection>,
    /// Connections replaced by a newer connection of the same account
    pub superseded: Vec<ConnectionId>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: ConnectionId, event: ServerEvent) {
        self.envelopes.push(Envelope { to, event });
    }

    /// Send the same event to several connections
    pub fn send_all<'a>(
        &mut self,
        recipients: impl IntoIterator<Item = &'a ConnectionId>,
        event: ServerEvent,
    ) {
        for to in recipients {
            self.send(*to, event.clone());
        }
    }

    pub fn project(&mut self, projection: RoomProjection) {
        self.projections.push(projection);
    }

    pub fn extend(&mut self, other: Effects) {
        self.envelopes.extend(other.envelopes);
        self.projections.extend(other.projections);
        self.superseded.extend(other.superseded);
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty() && self.projections.is_empty() && self.superseded.is_empty()
    }

    /// Events addressed to one connection, in order
    pub fn events_for(&self, connection_id: &ConnectionId) -> Vec<&ServerEvent> {
        self.envelopes
            .iter()
            .filter(|e| e.to == *connection_id)
            .map(|e| &e.event)
            .collect()
    }
}

/// Directory of per-connection outbound channels
#[derive(Debug, Default)]
pub struct Mailboxes {
    senders: DashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: ConnectionId, tx: mpsc::Sender<ServerEvent>) {
        self.senders.insert(connection_id, tx);
    }

    /// Drop a connection's sender; its writer task ends once the channel drains
    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.senders.remove(connection_id);
    }

    /// Drop every sender (server shutdown)
    pub fn clear(&self) {
        self.senders.clear();
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Deliver envelopes in order without waiting on any recipient
    ///
    /// Closed or unknown recipients are skipped. A recipient whose buffer is
    /// full has stopped draining its socket: its mailbox is dropped and its id
    /// returned so the caller can tear the connection down.
    pub fn deliver(&self, envelopes: Vec<Envelope>) -> Vec<ConnectionId> {
        let mut evicted = Vec::new();
        for Envelope { to, event } in envelopes {
            let Some(tx) = self.senders.get(&to).map(|entry| entry.clone()) else {
                tracing::trace!(connection_id = %to, kind = event.kind(), "No mailbox for recipient");
                continue;
            };
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    tracing::warn!(
                        connection_id = %to,
                        kind = event.kind(),
                        "Outbound buffer full, dropping connection"
                    );
                    self.unregister(&to);
                    evicted.push(to);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %to, "Mailbox closed, dropping event");
                }
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_deliver_in_order() {
        let mailboxes = Mailboxes::new();
        let (tx, mut rx) = mpsc::channel(16);
        let id = Uuid::new_v4();
        mailboxes.register(id, tx);

        let mut effects = Effects::new();
        effects.send(id, ServerEvent::Pong);
        effects.send(id, ServerEvent::PartnerDisconnected);
        assert!(mailboxes.deliver(effects.envelopes).is_empty());

        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Pong);
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::PartnerDisconnected);
    }

    #[tokio::test]
    async fn test_deliver_skips_unknown_recipient() {
        let mailboxes = Mailboxes::new();
        let evicted = mailboxes.deliver(vec![Envelope {
            to: Uuid::new_v4(),
            event: ServerEvent::Pong,
        }]);
        assert!(evicted.is_empty());
        assert!(mailboxes.is_empty());
    }

    #[tokio::test]
    async fn test_full_recipient_is_evicted_without_blocking() {
        let mailboxes = Mailboxes::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = Uuid::new_v4();
        let fast = Uuid::new_v4();
        mailboxes.register(slow, slow_tx);
        mailboxes.register(fast, fast_tx);

        let mut effects = Effects::new();
        effects.send(slow, ServerEvent::Pong);
        effects.send_all([&slow, &fast], ServerEvent::PartnerDisconnected);
        effects.send(slow, ServerEvent::Pong);
        let evicted = mailboxes.deliver(effects.envelopes);

        assert_eq!(evicted, vec![slow]);
        assert_eq!(mailboxes.len(), 1);
        assert_eq!(fast_rx.try_recv().unwrap(), ServerEvent::PartnerDisconnected);

        // The slow side keeps what fit, then sees its channel closed
        assert_eq!(slow_rx.recv().await, Some(ServerEvent::Pong));
        assert_eq!(slow_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_unregister_closes_channel() {
        let mailboxes = Mailboxes::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = Uuid::new_v4();
        mailboxes.register(id, tx);
        mailboxes.unregister(&id);

        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_effects_events_for() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut effects = Effects::new();
        effects.send_all([&a, &b], ServerEvent::Pong);
        effects.send(b, ServerEvent::PartnerDisconnected);

        assert_eq!(effects.events_for(&a).len(), 1);
        assert_eq!(effects.events_for(&b).len(), 2);
    }
}
