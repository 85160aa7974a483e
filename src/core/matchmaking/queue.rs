//! FIFO waiting pools keyed by intent

use std::collections::VecDeque;

use super::protocol::{ConnectionId, Intent};

/// Four arrival-ordered pools, one per intent
#[derive(Debug, Default)]
pub struct IntentQueue {
    talk: VecDeque<ConnectionId>,
    listen: VecDeque<ConnectionId>,
    both: VecDeque<ConnectionId>,
    sponsor: VecDeque<ConnectionId>,
}

impl IntentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self, intent: Intent) -> &VecDeque<ConnectionId> {
        match intent {
            Intent::Talk => &self.talk,
            Intent::Listen => &self.listen,
            Intent::Both => &self.both,
            Intent::Sponsor => &self.sponsor,
        }
    }

    fn pool_mut(&mut self, intent: Intent) -> &mut VecDeque<ConnectionId> {
        match intent {
            Intent::Talk => &mut self.talk,
            Intent::Listen => &mut self.listen,
            Intent::Both => &mut self.both,
            Intent::Sponsor => &mut self.sponsor,
        }
    }

    /// Append to the back of `intent`'s pool. A connection already queued
    /// anywhere is moved, so it is never present in two pools.
    pub fn enqueue(&mut self, connection_id: ConnectionId, intent: Intent) {
        self.remove(&connection_id);
        self.pool_mut(intent).push_back(connection_id);
    }

    /// Remove from every pool. Returns whether it was queued.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> bool {
        let mut removed = false;
        for intent in Intent::ALL {
            let pool = self.pool_mut(intent);
            if let Some(index) = pool.iter().position(|id| id == connection_id) {
                pool.remove(index);
                removed = true;
            }
        }
        removed
    }

    /// Oldest entry in `intent`'s pool that is not `exclude`
    pub fn peek_oldest(&self, intent: Intent, exclude: &ConnectionId) -> Option<ConnectionId> {
        self.pool(intent).iter().find(|id| *id != exclude).copied()
    }

    /// Remove and return the oldest entry in `intent`'s pool that is not `exclude`
    pub fn take_oldest(&mut self, intent: Intent, exclude: &ConnectionId) -> Option<ConnectionId> {
        let pool = self.pool_mut(intent);
        let index = pool.iter().position(|id| id != exclude)?;
        pool.remove(index)
    }

    /// Pool a connection is waiting in, if any
    pub fn intent_of(&self, connection_id: &ConnectionId) -> Option<Intent> {
        Intent::ALL
            .into_iter()
            .find(|intent| self.pool(*intent).contains(connection_id))
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.intent_of(connection_id).is_some()
    }

    pub fn len(&self, intent: Intent) -> usize {
        self.pool(intent).len()
    }

    pub fn total_len(&self) -> usize {
        Intent::ALL.into_iter().map(|intent| self.len(intent)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Every queued connection with its pool
    pub fn entries(&self) -> Vec<(Intent, ConnectionId)> {
        Intent::ALL
            .into_iter()
            .flat_map(|intent| self.pool(intent).iter().map(move |id| (intent, *id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_fifo_order_within_pool() {
        let mut queue = IntentQueue::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        queue.enqueue(first, Intent::Listen);
        queue.enqueue(second, Intent::Listen);

        let nobody = Uuid::new_v4();
        assert_eq!(queue.take_oldest(Intent::Listen, &nobody), Some(first));
        assert_eq!(queue.take_oldest(Intent::Listen, &nobody), Some(second));
        assert_eq!(queue.take_oldest(Intent::Listen, &nobody), None);
    }

    #[test]
    fn test_enqueue_moves_between_pools() {
        let mut queue = IntentQueue::new();
        let id = Uuid::new_v4();
        queue.enqueue(id, Intent::Talk);
        queue.enqueue(id, Intent::Both);

        assert_eq!(queue.len(Intent::Talk), 0);
        assert_eq!(queue.len(Intent::Both), 1);
        assert_eq!(queue.intent_of(&id), Some(Intent::Both));
        assert_eq!(queue.total_len(), 1);
    }

    #[test]
    fn test_take_oldest_skips_excluded() {
        let mut queue = IntentQueue::new();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        queue.enqueue(me, Intent::Both);
        queue.enqueue(other, Intent::Both);

        assert_eq!(queue.take_oldest(Intent::Both, &me), Some(other));
        assert!(queue.contains(&me));
        assert_eq!(queue.take_oldest(Intent::Both, &me), None);
    }

    #[test]
    fn test_remove_reports_membership() {
        let mut queue = IntentQueue::new();
        let id = Uuid::new_v4();

        assert!(!queue.remove(&id));
        queue.enqueue(id, Intent::Sponsor);
        assert!(queue.remove(&id));
        assert!(queue.is_empty());
    }
}
