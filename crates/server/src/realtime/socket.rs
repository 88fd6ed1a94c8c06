//! The `/ws` endpoint.
//!
//! Authentication happens before the upgrade, so a bad token is a plain
//! 401. After the upgrade each connection gets a writer task draining its
//! hub queue and a reader loop dispatching client commands.

use axum::extract::State;
use axum::extract::ws::{Message as Frame, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::instrument;

use tradepost_core::{ConnectionId, UserId};

use super::protocol::{ClientCommand, ServerEvent};
use crate::error::{AppError, Result};
use crate::extract::Query;
use crate::middleware::{authenticate, bearer_token};
use crate::models::{Notification, User};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SocketParams {
    pub token: Option<String>,
}

/// Upgrade to a WebSocket.
///
/// GET /ws?token=<token>
///
/// Browsers cannot set headers on a WebSocket handshake, hence the query
/// parameter; an `Authorization` header works too.
///
/// # Errors
///
/// Returns 401 for a missing or invalid token and 400 for a request that
/// is not a WebSocket handshake.
#[instrument(skip_all, fields(user_id))]
pub async fn upgrade(
    State(state): State<AppState>,
    Query(params): Query<SocketParams>,
    headers: HeaderMap,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response> {
    let token = params
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;
    let user = authenticate(&state, token).await?;

    let ws = ws.map_err(|e| AppError::BadRequest(e.body_text()))?;
    Ok(ws.on_upgrade(move |socket| run(state, user, socket)))
}

/// Decode a text frame.
///
/// # Errors
///
/// Returns the `error` event to send back for an unreadable frame.
fn parse_frame(text: &str) -> std::result::Result<ClientCommand, ServerEvent> {
    serde_json::from_str(text).map_err(|e| ServerEvent::error(format!("Invalid frame: {e}")))
}

/// Execute a command; the reply, if any, goes to this connection only.
async fn dispatch(state: &AppState, user: UserId, command: ClientCommand) -> Result<Option<ServerEvent>> {
    match command {
        ClientCommand::Ping => Ok(Some(ServerEvent::Pong)),
        // The hub echoes the message to all of the sender's sockets.
        ClientCommand::SendMessage { room_id, body } => state
            .chat()
            .post_message(user, room_id, &body)
            .await
            .map(|_| None),
        ClientCommand::MarkRead { room_id } => {
            state.chat().mark_read(user, room_id).await.map(|_| None)
        }
        ClientCommand::Typing { room_id } => state.chat().typing(user, room_id).await.map(|()| None),
    }
}

async fn handle_text(state: &AppState, user: UserId, conn: ConnectionId, text: &str) {
    let reply = match parse_frame(text) {
        Ok(command) => dispatch(state, user, command)
            .await
            .unwrap_or_else(|e| Some(ServerEvent::error(e.public_message()))),
        Err(event) => Some(event),
    };

    if let Some(event) = reply {
        state.hub().send_to_connection(user, conn, event);
    }
}

#[instrument(skip_all, fields(user_id = %user.id))]
async fn run(state: AppState, user: User, socket: WebSocket) {
    let (conn, mut outbox) = state.hub().register(user.id);
    tracing::info!(
        connection_id = %conn,
        open_connections = state.hub().connection_count(),
        "Socket connected"
    );

    let unread_notifications = state
        .store()
        .read(|t| {
            t.all::<Notification>()
                .filter(|n| n.user_id == user.id && !n.read)
                .count()
        })
        .await;
    state.hub().send_to_connection(
        user.id,
        conn,
        ServerEvent::Hello {
            user_id: user.id,
            unread_notifications,
        },
    );

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, kind = event.kind(), "Failed to encode event");
                    continue;
                }
            };
            if sink.send(Frame::Text(text.into())).await.is_err() {
                break;
            }
        }
        sink.close().await.ok();
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => handle_text(&state, user.id, conn, text.as_str()).await,
                Some(Ok(Frame::Binary(_))) => {
                    state.hub().send_to_connection(
                        user.id,
                        conn,
                        ServerEvent::error("Binary frames are not supported"),
                    );
                }
                Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => {}
                Some(Ok(Frame::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Socket read failed");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    state.hub().unregister(user.id, conn);
    writer.abort();
    tracing::info!(connection_id = %conn, "Socket disconnected");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use tradepost_core::{ChatRoomId, UserRole};

    use super::*;
    use crate::config::ServerConfig;
    use crate::services::auth::NewUser;
    use crate::store::Store;

    fn test_state() -> AppState {
        let config = ServerConfig::new(SecretString::from("socket-test-signing-key-Vb7#qW4!zR9@"));
        AppState::new(config, Store::memory())
    }

    async fn create(state: &AppState, username: &str) -> UserId {
        let email = format!("{username}@example.com");
        state
            .auth()
            .create_user(NewUser {
                username,
                email: &email,
                password: "correct horse battery",
                display_name: None,
                role: UserRole::Customer,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_commands_reach_the_peer() {
        let state = test_state();
        let alice = create(&state, "alice").await;
        let bob = create(&state, "bob").await;
        let (room, _) = state.chat().open_room(alice, bob, None).await.unwrap();
        let (alice_conn, mut alice_rx) = state.hub().register(alice);
        let (bob_conn, mut bob_rx) = state.hub().register(bob);

        let frame = format!(r#"{{"type":"send_message","room_id":"{}","body":"hi bob"}}"#, room.id);
        handle_text(&state, alice, alice_conn, &frame).await;

        let Ok(ServerEvent::ChatMessage(message)) = bob_rx.try_recv() else {
            panic!("peer should receive the message");
        };
        assert_eq!(message.body, "hi bob");
        assert!(matches!(bob_rx.try_recv(), Ok(ServerEvent::Notification(_))));
        assert!(matches!(alice_rx.try_recv(), Ok(ServerEvent::ChatMessage(_))));

        let frame = format!(r#"{{"type":"mark_read","room_id":"{}"}}"#, room.id);
        handle_text(&state, bob, bob_conn, &frame).await;
        let Ok(ServerEvent::MessagesRead { reader_id, count, .. }) = alice_rx.try_recv() else {
            panic!("sender should see the read receipt");
        };
        assert_eq!(reader_id, bob);
        assert_eq!(count, 1);
        assert!(matches!(bob_rx.try_recv(), Ok(ServerEvent::MessagesRead { .. })));

        handle_text(&state, bob, bob_conn, r#"{"type":"ping"}"#).await;
        assert!(matches!(bob_rx.try_recv(), Ok(ServerEvent::Pong)));
        // Replies go to the asking connection only.
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failures_come_back_as_error_events() {
        let state = test_state();
        let alice = create(&state, "alice").await;
        let (conn, mut rx) = state.hub().register(alice);

        handle_text(&state, alice, conn, "not json").await;
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Error { .. })));

        let frame = format!(r#"{{"type":"typing","room_id":"{}"}}"#, ChatRoomId::new());
        handle_text(&state, alice, conn, &frame).await;
        let Ok(ServerEvent::Error { message }) = rx.try_recv() else {
            panic!("unknown room should be reported");
        };
        assert!(message.contains("not found"), "{message}");
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame(r#"{"type":"ping"}"#).unwrap(), ClientCommand::Ping);

        let room_id = ChatRoomId::new();
        let text = format!(r#"{{"type":"typing","room_id":"{room_id}"}}"#);
        assert_eq!(parse_frame(&text).unwrap(), ClientCommand::Typing { room_id });
    }

    #[test]
    fn test_malformed_frame_becomes_error_event() {
        for text in ["not json", r#"{"type":"shout"}"#, r#"{"type":"mark_read"}"#] {
            let event = parse_frame(text).unwrap_err();
            assert_eq!(event.kind(), "error");
        }
    }
}
