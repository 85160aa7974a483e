//! WebSocket handler for matchmaking
//!
//! One task per connection reads frames and feeds them to the shared state;
//! a second task drains the connection's mailbox into the socket. Deliveries
//! for one event are queued before the next frame is read, so a sender's
//! events reach every recipient in the order they were sent. A recipient
//! whose mailbox is full is dropped rather than waited on.
//!
//! WebSocket URL: ws(s)://{host}/ws

use axum::{
    Json,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, Utf8Bytes, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::api::MatchmakingState;
use super::auth::Viewer;
use super::protocol::*;

/// Channel buffer size for outgoing events
const OUTGOING_BUFFER_SIZE: usize = 64;

// ============================================================================
// WebSocket Handler
// ============================================================================

/// WebSocket upgrade handler
///
/// The viewer is resolved before the upgrade, from the Authorization header,
/// the `token` query parameter or the session cookie.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<MatchmakingState>,
    viewer: Viewer,
) -> Response {
    if !state.is_accepting() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::internal("Server is not accepting connections")),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, viewer, state))
        .into_response()
}

/// What to do with one inbound frame
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Text(Utf8Bytes),
    Unsupported,
    Ignore,
    Close,
}

fn classify(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Text(text),
        Message::Binary(_) => Inbound::Unsupported,
        Message::Ping(_) | Message::Pong(_) => Inbound::Ignore,
        Message::Close(_) => Inbound::Close,
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(kind = event.kind(), "Failed to serialize event: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, viewer: Viewer, state: MatchmakingState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTGOING_BUFFER_SIZE);

    // Forward mailbox events to the socket; ends when the mailbox is dropped
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Some(message) = encode(&event) else {
                continue;
            };
            if ws_sender.send(message).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let Some(connection_id) = state.connect(viewer, tx).await else {
        send_task.abort();
        return;
    };

    let mut limiter = state.frame_limiter();

    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                let Some(frame) = frame else {
                    break;
                };
                let message = match frame {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::debug!(connection_id = %connection_id, "WebSocket error: {}", e);
                        break;
                    }
                };

                match classify(message) {
                    Inbound::Text(text) => {
                        if !limiter.try_acquire() {
                            if limiter.first_rejection() {
                                tracing::warn!(connection_id = %connection_id, "Rate limit exceeded");
                            }
                            state
                                .notify(
                                    connection_id,
                                    ServerEvent::error(WsErrorCode::RateLimited, "Too many messages"),
                                )
                                .await;
                            continue;
                        }
                        state.handle_frame(connection_id, text.as_str()).await;
                    }
                    Inbound::Unsupported => {
                        state
                            .notify(
                                connection_id,
                                ServerEvent::error(
                                    WsErrorCode::InvalidMessage,
                                    "Binary frames are not supported",
                                ),
                            )
                            .await;
                    }
                    Inbound::Ignore => {}
                    Inbound::Close => {
                        tracing::debug!(connection_id = %connection_id, "Client closed connection");
                        break;
                    }
                }
            }
            // Mailbox dropped (superseded or server stopping) or socket gone
            _ = &mut send_task => {
                break;
            }
        }
    }

    state.disconnect(connection_id).await;
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    #[test]
    fn test_classify_frames() {
        let frame = Utf8Bytes::from_static("{\"type\":\"ping\"}");
        assert_eq!(
            classify(Message::Text(frame.clone())),
            Inbound::Text(frame)
        );
        assert_eq!(
            classify(Message::Binary(Bytes::from_static(b"\x00\x01"))),
            Inbound::Unsupported
        );
        assert_eq!(classify(Message::Ping(Bytes::new())), Inbound::Ignore);
        assert_eq!(classify(Message::Pong(Bytes::new())), Inbound::Ignore);
        assert_eq!(classify(Message::Close(None)), Inbound::Close);
    }

    #[test]
    fn test_encode_event() {
        let Some(Message::Text(text)) = encode(&ServerEvent::Pong) else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["type"], "pong");

        let Some(Message::Text(text)) = encode(&ServerEvent::error(
            WsErrorCode::RateLimited,
            "Too many messages",
        )) else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["code"], "rate_limited");
    }
}
