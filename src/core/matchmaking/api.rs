//! Shared state and HTTP surface for matchmaking
//!
//! Routes:
//! - `GET  /api/health` - liveness, including the profile store
//! - `GET  /api/rooms` - current room snapshots
//! - `POST /api/ratings` - rate the partner of a finished 1:1 session
//! - `GET  /ws` - WebSocket upgrade (see the websocket module)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::{Mutex, mpsc};

use super::auth::Viewer;
use super::error::HubError;
use super::hub::Hub;
use super::mailbox::{Effects, Mailboxes, RoomProjection};
use super::protocol::*;
use super::rate_limiter::FrameLimiter;
use super::room::Room;
use super::websocket::ws_handler;
use crate::core::auth::JwtService;
use crate::core::config::DEFAULT_WS_MESSAGES_PER_SECOND;
use crate::core::db::models::{CreateRating, CreateRoom, MAX_RATING, MIN_RATING};
use crate::core::store::{ProfileStore, StoreError};

// ============================================================================
// Application State
// ============================================================================

/// Shared state for matchmaking handlers
///
/// The hub lives behind one async mutex; every inbound event is handled in a
/// single critical section. Store calls and deliveries happen outside it.
#[derive(Clone)]
pub struct MatchmakingState {
    hub: Arc<Mutex<Hub>>,
    mailboxes: Arc<Mailboxes>,
    store: Arc<dyn ProfileStore>,
    jwt: Option<JwtService>,
    accepting: Arc<AtomicBool>,
    messages_per_second: u32,
    burst: u32,
}

impl MatchmakingState {
    pub fn new(store: Arc<dyn ProfileStore>, jwt: Option<JwtService>) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub::new())),
            mailboxes: Arc::new(Mailboxes::new()),
            store,
            jwt,
            accepting: Arc::new(AtomicBool::new(false)),
            messages_per_second: DEFAULT_WS_MESSAGES_PER_SECOND,
            burst: DEFAULT_WS_MESSAGES_PER_SECOND * 2,
        }
    }

    /// Per-connection inbound frame budget
    pub fn with_rate_limit(mut self, messages_per_second: u32, burst: u32) -> Self {
        self.messages_per_second = messages_per_second;
        self.burst = burst;
        self
    }

    pub fn store(&self) -> &dyn ProfileStore {
        self.store.as_ref()
    }

    pub fn jwt(&self) -> Option<&JwtService> {
        self.jwt.as_ref()
    }

    pub fn hub(&self) -> &Mutex<Hub> {
        &self.hub
    }

    pub fn frame_limiter(&self) -> FrameLimiter {
        FrameLimiter::new(self.messages_per_second, self.burst)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open admission
    ///
    /// Rooms still marked active in the store belong to a previous process and
    /// have no members any more; they are closed first.
    pub async fn start(&self) {
        match self.store.list_rooms().await {
            Ok(stale) => {
                for record in stale {
                    if let Err(e) = self.store.close_room(record.id).await {
                        tracing::warn!(room_id = %record.id, error = %e, "Failed to close stale room");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to list stale rooms"),
        }

        self.accepting.store(true, Ordering::Release);
        tracing::info!("Matchmaking started");
    }

    /// Close admission and disconnect everyone
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::Release);

        let effects = self.hub.lock().await.shutdown();
        self.dispatch(effects).await;
        self.mailboxes.clear();

        tracing::info!("Matchmaking stopped");
    }

    // ========================================================================
    // Connection flow
    // ========================================================================

    /// Register a new connection; `None` once admission is closed
    pub async fn connect(
        &self,
        viewer: Viewer,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Option<ConnectionId> {
        if !self.is_accepting() {
            return None;
        }

        let connection_id = uuid::Uuid::new_v4();
        self.mailboxes.register(connection_id, tx);
        let effects = self
            .hub
            .lock()
            .await
            .connect(viewer.into_session(connection_id));
        self.dispatch(effects).await;
        Some(connection_id)
    }

    /// Handle one raw text frame
    pub async fn handle_frame(&self, connection_id: ConnectionId, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => self.handle_event(connection_id, event).await,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Invalid frame");
                self.report(connection_id, HubError::Validation(e)).await;
            }
        }
    }

    /// Handle one parsed event; returns after its deliveries are queued
    pub async fn handle_event(&self, connection_id: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::CreateRoom {
                title,
                genre,
                capacity,
            } => self.create_room(connection_id, title, genre, capacity).await,
            event => self.hub.lock().await.handle(connection_id, event),
        };

        match result {
            Ok(effects) => self.dispatch(effects).await,
            Err(e) => self.report(connection_id, e).await,
        }
    }

    /// Transport closed
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let effects = self.hub.lock().await.disconnect(&connection_id);
        self.mailboxes.unregister(&connection_id);
        self.dispatch(effects).await;
    }

    /// Persist, then open, a room hosted by `connection_id`
    ///
    /// The lock is released while the store call is in flight, so the host is
    /// checked again before the room goes live. If that check fails the
    /// durable record is closed and nothing is emitted.
    async fn create_room(
        &self,
        connection_id: ConnectionId,
        title: String,
        genre: String,
        capacity: usize,
    ) -> Result<Effects, HubError> {
        validate_title(&title)?;
        validate_genre(&genre)?;
        validate_capacity(capacity)?;
        let stored_capacity = i32::try_from(capacity).map_err(|_| ValidationError::Capacity)?;

        let host = self.hub.lock().await.authorize_room_host(&connection_id)?;

        let record = self
            .store
            .create_room(CreateRoom {
                host_account_id: host.account_id,
                title: title.trim().to_string(),
                genre,
                capacity: stored_capacity,
            })
            .await?;

        let room = Room::new(
            record.id,
            host.account_id,
            record.title.clone(),
            record.genre.clone(),
            capacity,
        )?;

        let opened = self.hub.lock().await.open_room(connection_id, room);
        match opened {
            Ok(effects) => Ok(effects),
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    room_id = %record.id,
                    error = %e,
                    "Host changed state while the room was persisted"
                );
                if let Err(e) = self.store.close_room(record.id).await {
                    tracing::warn!(room_id = %record.id, error = %e, "Failed to close abandoned room");
                }
                Ok(Effects::new())
            }
        }
    }

    // ========================================================================
    // Effects
    // ========================================================================

    /// Deliver effects, then tear down any recipient that stopped draining
    async fn dispatch(&self, effects: Effects) {
        let mut pending = vec![effects];
        while let Some(Effects {
            envelopes,
            projections,
            superseded,
        }) = pending.pop()
        {
            let evicted = self.mailboxes.deliver(envelopes);
            for stale in &superseded {
                self.mailboxes.unregister(stale);
            }
            self.apply_projections(projections).await;

            for connection_id in evicted {
                let effects = self.hub.lock().await.disconnect(&connection_id);
                pending.push(effects);
            }
        }
    }

    /// Mirror membership changes into the store; failures never undo them
    async fn apply_projections(&self, projections: Vec<RoomProjection>) {
        for projection in projections {
            let result = match &projection {
                RoomProjection::Joined {
                    room_id,
                    connection_id,
                    account_id,
                } => {
                    self.store
                        .record_join(*room_id, *connection_id, *account_id)
                        .await
                }
                RoomProjection::Left {
                    room_id,
                    connection_id,
                } => self.store.record_leave(*room_id, *connection_id).await,
                RoomProjection::Closed { room_id } => self.store.close_room(*room_id).await,
            };

            if let Err(e) = result {
                tracing::warn!(?projection, error = %e, "Failed to persist room change");
            }
        }
    }

    async fn report(&self, connection_id: ConnectionId, err: HubError) {
        if err.is_benign() {
            tracing::debug!(connection_id = %connection_id, error = %err, "Event ignored");
        } else if matches!(err, HubError::Store(_)) {
            tracing::error!(connection_id = %connection_id, error = %err, "Event failed");
        } else {
            tracing::warn!(connection_id = %connection_id, error = %err, "Event rejected");
        }

        if let Some(event) = err.to_event() {
            self.notify(connection_id, event).await;
        }
    }

    /// Send one event to one connection
    pub async fn notify(&self, connection_id: ConnectionId, event: ServerEvent) {
        let mut effects = Effects::new();
        effects.send(connection_id, event);
        self.dispatch(effects).await;
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the matchmaking router
pub fn matchmaking_router(state: MatchmakingState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/rooms", get(list_rooms))
        .route("/api/ratings", post(create_rating))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

// ============================================================================
// API Handlers
// ============================================================================

/// Liveness of the process and its profile store
///
/// GET /api/health
///
/// Response: `{"status":"ok"}` (200) or `{"status":"unavailable"}` (503)
async fn health(State(state): State<MatchmakingState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

async fn list_rooms(State(state): State<MatchmakingState>) -> impl IntoResponse {
    let rooms = state.hub.lock().await.room_list();
    Json(rooms)
}

/// Rate the partner of a recent 1:1 session
///
/// POST /api/ratings
///
/// Request body: CreateRatingRequest
/// Response: Rating (201 Created) or ApiError (409 if this session's
/// partner was already rated)
async fn create_rating(
    State(state): State<MatchmakingState>,
    viewer: Viewer,
    Json(request): Json<CreateRatingRequest>,
) -> Response {
    if !(MIN_RATING..=MAX_RATING).contains(&request.rating) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::bad_request("Rating must be between 1 and 5")),
        )
            .into_response();
    }

    let participant = state
        .hub
        .lock()
        .await
        .session_participant(&request.session_id, &request.partner_connection_id);

    let Some(participant) = participant else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found("Session not found")),
        )
            .into_response();
    };
    let Some(rated_account_id) = participant.account_id else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found("Partner has no account")),
        )
            .into_response();
    };

    let rating = CreateRating {
        rater_account_id: viewer.account_id,
        rated_account_id,
        session_id: request.session_id,
        rating: request.rating,
    };

    match state.store.create_rating(rating).await {
        Ok(rating) => (StatusCode::CREATED, Json(rating)).into_response(),
        Err(StoreError::Invalid(message)) => {
            (StatusCode::BAD_REQUEST, Json(ApiError::bad_request(message))).into_response()
        }
        Err(StoreError::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found("Account not found")),
        )
            .into_response(),
        Err(StoreError::Conflict(_)) => (
            StatusCode::CONFLICT,
            Json(ApiError::conflict("Session already rated")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to store rating");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal("Failed to store rating")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
