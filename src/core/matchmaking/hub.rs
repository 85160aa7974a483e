//! Matchmaking authority
//!
//! The hub owns every piece of mutable matchmaking state: the connection
//! registry, the intent pools, the room table and the session ledger. Callers
//! hold it behind one lock, so each inbound event is processed in a single
//! critical section and two arrivals can never claim the same partner.
//!
//! Commands never perform I/O. They return `Effects`, which the caller
//! delivers after releasing the lock.

use chrono::Utc;
use uuid::Uuid;

use super::error::HubError;
use super::ledger::{SessionLedger, SessionParticipant};
use super::mailbox::{Effects, RoomProjection};
use super::matcher::{self, MatchPlan};
use super::protocol::*;
use super::queue::IntentQueue;
use super::registry::ConnectionRegistry;
use super::room::{LeaveOutcome, Room, RoomManager};
use super::session::ConnectionSession;

/// How a connection is leaving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// In-app leave; the connection stays registered as IDLE
    Leave,
    /// Transport closed; the connection is forgotten
    Disconnect,
}

/// Identity allowed to host a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomHost {
    pub connection_id: ConnectionId,
    pub account_id: AccountId,
}

#[derive(Debug, Default)]
pub struct Hub {
    registry: ConnectionRegistry,
    queue: IntentQueue,
    rooms: RoomManager,
    ledger: SessionLedger,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn session(&self, connection_id: &ConnectionId) -> Option<&ConnectionSession> {
        self.registry.get(connection_id)
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_list(&self) -> Vec<RoomSnapshot> {
        self.rooms.list()
    }

    pub fn queue(&self) -> &IntentQueue {
        &self.queue
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Participant of a recent 1:1 session
    pub fn session_participant(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Option<SessionParticipant> {
        self.ledger.participant(session_id, connection_id)
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Register a freshly accepted connection
    ///
    /// If the same account still holds a room seat under an older connection,
    /// the new connection takes that seat over.
    pub fn connect(&mut self, session: ConnectionSession) -> Effects {
        let connection_id = session.connection_id;
        let mut effects = Effects::new();
        effects.send(
            connection_id,
            ServerEvent::Connected {
                connection_id,
                display_name: session.display_name.clone(),
                authenticated: session.authenticated,
            },
        );

        tracing::info!(
            connection_id = %connection_id,
            account_id = ?session.account_id,
            "Connection registered"
        );

        let account_id = session.account_id;
        self.registry.insert(session);

        if let Some(account_id) = account_id
            && let Some((stale, room_id)) = self.registry.seat_of_account(&account_id, &connection_id)
        {
            effects.extend(self.supersede(stale, connection_id, room_id));
        }

        effects
    }

    /// Transport closed
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Effects {
        self.teardown(*connection_id, Teardown::Disconnect)
    }

    /// Disconnect every connection (server shutdown)
    pub fn shutdown(&mut self) -> Effects {
        let mut effects = Effects::new();
        for connection_id in self.registry.connection_ids() {
            effects.extend(self.teardown(connection_id, Teardown::Disconnect));
        }
        effects
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    /// Process one inbound event from `connection_id`
    pub fn handle(
        &mut self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<Effects, HubError> {
        event.validate()?;

        match event {
            ClientEvent::JoinQueue { intent } => self.join_queue(connection_id, intent),
            ClientEvent::EmergencySupport => self.join_queue(connection_id, Intent::Talk),
            ClientEvent::Message { content } => self.relay(connection_id, content),
            ClientEvent::LeaveSession => Ok(self.teardown(connection_id, Teardown::Leave)),
            ClientEvent::CreateRoom {
                title,
                genre,
                capacity,
            } => self.create_room(connection_id, &title, &genre, capacity),
            ClientEvent::JoinRoom { room_id } => self.join_room(connection_id, room_id),
            ClientEvent::LeaveRoom => self.leave_room(connection_id),
            ClientEvent::GetRooms => {
                self.require(&connection_id)?;
                let mut effects = Effects::new();
                effects.send(
                    connection_id,
                    ServerEvent::RoomList {
                        rooms: self.rooms.list(),
                    },
                );
                Ok(effects)
            }
            ClientEvent::Ping => {
                self.require(&connection_id)?;
                let mut effects = Effects::new();
                effects.send(connection_id, ServerEvent::Pong);
                Ok(effects)
            }
        }
    }

    fn require(&self, connection_id: &ConnectionId) -> Result<&ConnectionSession, HubError> {
        self.registry
            .get(connection_id)
            .ok_or(HubError::UnknownConnection)
    }

    /// IDLE and outside any room
    fn require_available(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<&ConnectionSession, HubError> {
        let session = self.require(connection_id)?;
        if !session.is_idle() || session.room_id.is_some() {
            return Err(HubError::StateConflict {
                state: session.state,
            });
        }
        Ok(session)
    }

    // ========================================================================
    // 1:1 matching
    // ========================================================================

    pub fn join_queue(
        &mut self,
        connection_id: ConnectionId,
        intent: Intent,
    ) -> Result<Effects, HubError> {
        self.require_available(&connection_id)?;

        if let Some(plan) = matcher::take_match(&connection_id, intent, &mut self.queue) {
            if self.is_waiting(&plan.partner) {
                return Ok(self.pair(connection_id, intent, plan));
            }
            tracing::warn!(
                connection_id = %connection_id,
                partner = %plan.partner,
                "Matched partner is no longer waiting, requeueing"
            );
        }

        self.queue.enqueue(connection_id, intent);
        if let Some(session) = self.registry.get_mut(&connection_id) {
            session.state = ConnectionState::Waiting;
            session.intent = Some(intent);
        }

        tracing::debug!(connection_id = %connection_id, intent = %intent, "Queued");

        let mut effects = Effects::new();
        effects.send(
            connection_id,
            ServerEvent::StateUpdate {
                state: ConnectionState::Waiting,
            },
        );
        Ok(effects)
    }

    fn is_waiting(&self, connection_id: &ConnectionId) -> bool {
        self.registry
            .get(connection_id)
            .is_some_and(|s| s.state == ConnectionState::Waiting && s.room_id.is_none())
    }

    fn pair(&mut self, requester: ConnectionId, intent: Intent, plan: MatchPlan) -> Effects {
        let session_id = Uuid::new_v4();
        let partner = plan.partner;
        let partner_role = plan.partner_role();

        for (id, other) in [(requester, partner), (partner, requester)] {
            if let Some(session) = self.registry.get_mut(&id) {
                session.state = ConnectionState::Matched;
                session.partner = Some(other);
                session.session_id = Some(session_id);
            }
        }
        if let Some(session) = self.registry.get_mut(&requester) {
            session.intent = Some(intent);
        }

        let mut effects = Effects::new();
        effects.send(
            requester,
            ServerEvent::MatchFound {
                session_id,
                role: plan.role,
                partner_intent: plan.pool,
                partner_connection_id: Some(partner),
            },
        );
        effects.send(
            partner,
            ServerEvent::MatchFound {
                session_id,
                role: partner_role,
                partner_intent: intent,
                partner_connection_id: Some(requester),
            },
        );

        // MATCHED only lasts until both sides have been told
        for id in [requester, partner] {
            if let Some(session) = self.registry.get_mut(&id) {
                session.state = ConnectionState::Active;
            }
        }

        let participant = |id: ConnectionId| SessionParticipant {
            connection_id: id,
            account_id: self.registry.get(&id).and_then(|s| s.account_id),
        };
        let participants = [participant(requester), participant(partner)];
        self.ledger.record(session_id, participants);

        tracing::info!(
            session_id = %session_id,
            requester = %requester,
            partner = %partner,
            role = ?plan.role,
            partner_role = ?partner_role,
            "Session matched"
        );

        effects
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    pub fn relay(
        &mut self,
        connection_id: ConnectionId,
        content: String,
    ) -> Result<Effects, HubError> {
        validate_content(&content)?;

        let session = self.require(&connection_id)?;
        if session.state != ConnectionState::Active {
            return Err(HubError::StateConflict {
                state: session.state,
            });
        }

        let mut effects = Effects::new();
        let id = Uuid::new_v4();
        let timestamp = Utc::now().timestamp_millis();

        if let Some(room_id) = session.room_id {
            let room = self.rooms.get(&room_id).ok_or(HubError::RoomNotFound)?;
            let recipients = room.participants().iter().filter(|p| **p != connection_id);
            effects.send_all(
                recipients,
                ServerEvent::Message {
                    id,
                    content,
                    sender_id: connection_id,
                    timestamp,
                    sender_name: Some(session.display_name.clone()),
                },
            );
        } else if let Some(partner) = session.partner
            && self.registry.contains(&partner)
        {
            effects.send(
                partner,
                ServerEvent::Message {
                    id,
                    content,
                    sender_id: connection_id,
                    timestamp,
                    sender_name: None,
                },
            );
        } else {
            return Err(HubError::StateConflict {
                state: session.state,
            });
        }

        Ok(effects)
    }

    // ========================================================================
    // Rooms
    // ========================================================================

    /// Check that `connection_id` may host a new room right now
    pub fn authorize_room_host(&self, connection_id: &ConnectionId) -> Result<RoomHost, HubError> {
        let session = self.require_available(connection_id)?;
        match (session.authenticated, session.account_id) {
            (true, Some(account_id)) => Ok(RoomHost {
                connection_id: *connection_id,
                account_id,
            }),
            _ => Err(HubError::Permission),
        }
    }

    /// Insert a room (already persisted by the caller) and seat its host
    ///
    /// Host eligibility is checked again, since the host may have moved on
    /// while the room was being persisted.
    pub fn open_room(
        &mut self,
        connection_id: ConnectionId,
        room: Room,
    ) -> Result<Effects, HubError> {
        let host = self.authorize_room_host(&connection_id)?;
        if room.host_account_id != host.account_id {
            return Err(HubError::Permission);
        }

        let room_id = room.id;
        self.rooms.insert(room)?;
        self.rooms.join(&room_id, connection_id)?;

        if let Some(session) = self.registry.get_mut(&connection_id) {
            session.state = ConnectionState::Active;
            session.room_id = Some(room_id);
        }

        tracing::info!(room_id = %room_id, host = %connection_id, "Room opened");

        let mut effects = Effects::new();
        effects.project(RoomProjection::Joined {
            room_id,
            connection_id,
            account_id: Some(host.account_id),
        });
        if let Some(room) = self.rooms.snapshot(&room_id) {
            effects.send(connection_id, ServerEvent::RoomJoined { room_id, room });
        }
        let everyone = self.registry.connection_ids();
        effects.send_all(
            &everyone,
            ServerEvent::RoomList {
                rooms: self.rooms.list(),
            },
        );
        Ok(effects)
    }

    /// Create and open a room with a freshly generated id
    pub fn create_room(
        &mut self,
        connection_id: ConnectionId,
        title: &str,
        genre: &str,
        capacity: usize,
    ) -> Result<Effects, HubError> {
        validate_title(title)?;
        validate_genre(genre)?;
        validate_capacity(capacity)?;

        let host = self.authorize_room_host(&connection_id)?;
        let room = Room::new(Uuid::new_v4(), host.account_id, title.trim(), genre, capacity)?;
        self.open_room(connection_id, room)
    }

    pub fn join_room(
        &mut self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<Effects, HubError> {
        let session = self.require(&connection_id)?;

        if session.room_id == Some(room_id) {
            let mut effects = Effects::new();
            if let Some(room) = self.rooms.snapshot(&room_id) {
                effects.send(connection_id, ServerEvent::RoomJoined { room_id, room });
            }
            return Ok(effects);
        }

        let session = self.require_available(&connection_id)?;
        let account_id = session.account_id;

        if let Some(account) = account_id
            && let Some(stale) = self.seat_held_by(&room_id, &account, &connection_id)
        {
            return Ok(self.supersede(stale, connection_id, room_id));
        }

        self.rooms.join(&room_id, connection_id)?;
        if let Some(session) = self.registry.get_mut(&connection_id) {
            session.state = ConnectionState::Active;
            session.room_id = Some(room_id);
        }

        tracing::debug!(room_id = %room_id, connection_id = %connection_id, "Joined room");

        let mut effects = Effects::new();
        effects.project(RoomProjection::Joined {
            room_id,
            connection_id,
            account_id,
        });
        if let Some(room) = self.rooms.snapshot(&room_id) {
            let others: Vec<ConnectionId> = room
                .participants
                .iter()
                .copied()
                .filter(|p| *p != connection_id)
                .collect();
            effects.send(
                connection_id,
                ServerEvent::RoomJoined {
                    room_id,
                    room: room.clone(),
                },
            );
            effects.send_all(&others, ServerEvent::RoomUpdate { room });
        }
        Ok(effects)
    }

    pub fn leave_room(&mut self, connection_id: ConnectionId) -> Result<Effects, HubError> {
        let session = self.require(&connection_id)?;
        let Some(room_id) = session.room_id else {
            return Err(HubError::StateConflict {
                state: session.state,
            });
        };

        let effects = self.vacate_seat(connection_id, room_id, Teardown::Leave);
        if let Some(session) = self.registry.get_mut(&connection_id) {
            session.reset();
        }
        Ok(effects)
    }

    /// Another connection of `account` seated in `room_id`
    fn seat_held_by(
        &self,
        room_id: &RoomId,
        account: &AccountId,
        except: &ConnectionId,
    ) -> Option<ConnectionId> {
        let room = self.rooms.get(room_id)?;
        room.participants().iter().copied().find(|p| {
            p != except
                && self
                    .registry
                    .get(p)
                    .is_some_and(|s| s.account_id.as_ref() == Some(account))
        })
    }

    /// Hand a room seat from a stale connection to its replacement
    fn supersede(&mut self, stale: ConnectionId, fresh: ConnectionId, room_id: RoomId) -> Effects {
        let mut effects = Effects::new();
        if !self.rooms.rebind(&room_id, &stale, fresh) {
            return effects;
        }

        self.queue.remove(&stale);
        self.registry.remove(&stale);

        let account_id = self.registry.get_mut(&fresh).and_then(|session| {
            session.state = ConnectionState::Active;
            session.room_id = Some(room_id);
            session.account_id
        });

        tracing::info!(
            room_id = %room_id,
            stale = %stale,
            fresh = %fresh,
            "Room seat rebound to newer connection"
        );

        effects.send(
            stale,
            ServerEvent::error(
                WsErrorCode::Superseded,
                "This account connected from somewhere else",
            ),
        );
        effects.superseded.push(stale);
        effects.project(RoomProjection::Left {
            room_id,
            connection_id: stale,
        });
        effects.project(RoomProjection::Joined {
            room_id,
            connection_id: fresh,
            account_id,
        });

        if let Some(room) = self.rooms.snapshot(&room_id) {
            let others: Vec<ConnectionId> = room
                .participants
                .iter()
                .copied()
                .filter(|p| *p != fresh)
                .collect();
            effects.send(
                fresh,
                ServerEvent::RoomJoined {
                    room_id,
                    room: room.clone(),
                },
            );
            effects.send_all(&others, ServerEvent::RoomUpdate { room });
        }
        effects
    }

    /// Remove a room membership and tell whoever needs to know
    fn vacate_seat(
        &mut self,
        connection_id: ConnectionId,
        room_id: RoomId,
        mode: Teardown,
    ) -> Effects {
        let mut effects = Effects::new();
        match self.rooms.leave(&room_id, &connection_id) {
            LeaveOutcome::NotMember => {}
            LeaveOutcome::Left(room) => {
                effects.project(RoomProjection::Left {
                    room_id,
                    connection_id,
                });
                let members = room.participants.clone();
                effects.send_all(&members, ServerEvent::RoomUpdate { room });
            }
            LeaveOutcome::Deleted => {
                effects.project(RoomProjection::Left {
                    room_id,
                    connection_id,
                });
                effects.project(RoomProjection::Closed { room_id });
                tracing::info!(room_id = %room_id, "Room closed");

                let recipients: Vec<ConnectionId> = self
                    .registry
                    .connection_ids()
                    .into_iter()
                    .filter(|id| mode == Teardown::Leave || *id != connection_id)
                    .collect();
                effects.send_all(
                    &recipients,
                    ServerEvent::RoomList {
                        rooms: self.rooms.list(),
                    },
                );
            }
        }
        effects
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Leave the queue, any room and any 1:1 session
    ///
    /// Idempotent: a second call for the same connection produces nothing,
    /// so a partner is told about a departure at most once.
    pub fn teardown(&mut self, connection_id: ConnectionId, mode: Teardown) -> Effects {
        let Some(session) = self.registry.get(&connection_id).cloned() else {
            return Effects::new();
        };

        let mut effects = Effects::new();
        self.queue.remove(&connection_id);

        if let Some(room_id) = session.room_id {
            effects.extend(self.vacate_seat(connection_id, room_id, mode));
        }

        if session.is_paired()
            && let Some(partner_id) = session.partner
            && let Some(partner) = self.registry.get_mut(&partner_id)
            && partner.partner == Some(connection_id)
        {
            partner.reset();
            effects.send(partner_id, ServerEvent::PartnerDisconnected);
            tracing::info!(
                session_id = ?session.session_id,
                connection_id = %connection_id,
                partner = %partner_id,
                "Session ended"
            );
        }

        match mode {
            Teardown::Disconnect => {
                self.registry.remove(&connection_id);
                tracing::info!(connection_id = %connection_id, "Connection removed");
            }
            Teardown::Leave => {
                if let Some(session) = self.registry.get_mut(&connection_id) {
                    session.reset();
                }
            }
        }

        effects
    }

    // ========================================================================
    // Consistency
    // ========================================================================

    /// Check cross-structure consistency; returns the first violation found
    pub fn verify_invariants(&self) -> Result<(), String> {
        for (intent, id) in self.queue.entries() {
            let session = self
                .registry
                .get(&id)
                .ok_or_else(|| format!("queued connection {id} is not registered"))?;
            if session.state != ConnectionState::Waiting || session.intent != Some(intent) {
                return Err(format!("queued connection {id} is not WAITING on {intent}"));
            }
        }

        for session in self.registry.iter() {
            let id = session.connection_id;
            match session.state {
                ConnectionState::Matched => {
                    return Err(format!("connection {id} left in MATCHED"));
                }
                ConnectionState::Waiting if !self.queue.contains(&id) => {
                    return Err(format!("WAITING connection {id} is not queued"));
                }
                ConnectionState::Idle
                    if session.partner.is_some() || session.room_id.is_some() =>
                {
                    return Err(format!("IDLE connection {id} still holds a partner or room"));
                }
                _ => {}
            }

            if session.partner.is_some() && session.room_id.is_some() {
                return Err(format!("connection {id} is both paired and in a room"));
            }

            if let Some(partner_id) = session.partner {
                let partner = self
                    .registry
                    .get(&partner_id)
                    .ok_or_else(|| format!("partner {partner_id} of {id} is not registered"))?;
                if partner.partner != Some(id) || partner.session_id != session.session_id {
                    return Err(format!("pairing {id} <-> {partner_id} is not symmetric"));
                }
            }

            if let Some(room_id) = session.room_id {
                let room = self
                    .rooms
                    .get(&room_id)
                    .ok_or_else(|| format!("room {room_id} of {id} does not exist"))?;
                if !room.has_participant(&id) {
                    return Err(format!("{id} is missing from room {room_id}"));
                }
            }
        }

        for room in self.rooms.iter() {
            if room.participant_count() == 0 {
                return Err(format!("room {} is empty", room.id));
            }
            if room.participant_count() > room.capacity {
                return Err(format!("room {} is over capacity", room.id));
            }
            for member in room.participants() {
                let in_room = self
                    .registry
                    .get(member)
                    .is_some_and(|s| s.room_id == Some(room.id));
                if !in_room {
                    return Err(format!("member {member} of room {} is stale", room.id));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
