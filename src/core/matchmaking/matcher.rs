//! Intent compatibility matcher
//!
//! Each requester intent scans a fixed, ordered list of pools; within a pool
//! the oldest arrival wins. The requester's role comes from the pool it draws
//! from; the partner's role is the inverse, except that a partner who queued
//! as `sponsor` always keeps the sponsor role.
//!
//! | requester | pools in priority order            |
//! |-----------|------------------------------------|
//! | talk      | sponsor, listen, both              |
//! | sponsor   | talk, both                         |
//! | listen    | talk, both                         |
//! | both      | talk, listen, both                 |

use super::protocol::{ConnectionId, Intent, Role};
use super::queue::IntentQueue;

/// Outcome of a successful match for the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPlan {
    /// Pool the partner was drawn from (its declared intent)
    pub pool: Intent,
    pub partner: ConnectionId,
    /// Role assigned to the requester
    pub role: Role,
}

impl MatchPlan {
    /// Role emitted to the partner
    pub fn partner_role(&self) -> Role {
        partner_role(self.role, self.pool)
    }
}

/// Pools a requester may draw from, in priority order, with the role the
/// requester takes when drawing from each
pub fn preferences(intent: Intent) -> &'static [(Intent, Role)] {
    match intent {
        Intent::Talk => &[
            (Intent::Sponsor, Role::Talker),
            (Intent::Listen, Role::Talker),
            (Intent::Both, Role::Talker),
        ],
        Intent::Sponsor => &[(Intent::Talk, Role::Sponsor), (Intent::Both, Role::Sponsor)],
        Intent::Listen => &[(Intent::Talk, Role::Listener), (Intent::Both, Role::Listener)],
        Intent::Both => &[
            (Intent::Talk, Role::Listener),
            (Intent::Listen, Role::Talker),
            (Intent::Both, Role::Peer),
        ],
    }
}

/// Role of the partner given the requester's role and the partner's intent
pub fn partner_role(requester_role: Role, partner_intent: Intent) -> Role {
    if partner_intent == Intent::Sponsor {
        Role::Sponsor
    } else {
        requester_role.inverse()
    }
}

/// Decide a partner without touching the pools
pub fn find_match(
    requester: &ConnectionId,
    intent: Intent,
    queue: &IntentQueue,
) -> Option<MatchPlan> {
    preferences(intent).iter().find_map(|(pool, role)| {
        queue
            .peek_oldest(*pool, requester)
            .map(|partner| MatchPlan {
                pool: *pool,
                partner,
                role: *role,
            })
    })
}

/// Decide a partner and remove it from its pool in the same step
///
/// Callers hold exclusive access to the queue for the duration of the call,
/// so two arrivals can never draw the same partner.
pub fn take_match(
    requester: &ConnectionId,
    intent: Intent,
    queue: &mut IntentQueue,
) -> Option<MatchPlan> {
    let plan = find_match(requester, intent, queue)?;
    let partner = queue.take_oldest(plan.pool, requester)?;
    debug_assert_eq!(partner, plan.partner);
    Some(MatchPlan { partner, ..plan })
}
