//! Buyer/seller chat over REST. The same operations are available on the
//! WebSocket.

use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tradepost_core::{ChatRoomId, OrderId, UserId};

use crate::error::Result;
use crate::extract::{Json, Page, Pagination, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::{ChatRoom, Message, User};
use crate::services::chat::{room_for, unread_count};
use crate::state::AppState;
use crate::store::Tables;

#[derive(Debug, Deserialize)]
pub struct OpenRoomRequest {
    pub peer_id: UserId,
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub peer_id: Option<UserId>,
    pub peer_name: Option<String>,
    pub last_message: Option<Message>,
    pub unread: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

fn room_view(tables: &Tables, room: &ChatRoom, user: UserId) -> RoomView {
    let peer_id = room.peer_of(user);
    RoomView {
        room: room.clone(),
        peer_id,
        peer_name: peer_id
            .and_then(|id| tables.get::<User>(id))
            .map(|u| u.display_name.clone()),
        last_message: tables
            .all::<Message>()
            .filter(|m| m.room_id == room.id)
            .max_by_key(|m| m.created_at)
            .cloned(),
        unread: unread_count(tables, room.id, user),
    }
}

/// The caller's rooms, most recently active first.
///
/// GET /api/chat/rooms
pub async fn rooms(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Json<Vec<RoomView>> {
    let mut rooms: Vec<RoomView> = state
        .store()
        .read(|t| {
            t.all::<ChatRoom>()
                .filter(|r| r.includes(user.id))
                .map(|r| room_view(t, r, user.id))
                .collect()
        })
        .await;

    rooms.sort_by(|a, b| b.room.last_activity_at.cmp(&a.room.last_activity_at));
    Json(rooms)
}

/// Get or create a room with another user.
///
/// POST /api/chat/rooms
///
/// # Errors
///
/// Returns 400 for a room with yourself, 404 for an unknown peer or order.
#[instrument(skip_all, fields(user_id = %user.id, peer_id = %body.peer_id))]
pub async fn open_room(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<OpenRoomRequest>,
) -> Result<(StatusCode, Json<RoomView>)> {
    let (room, created) = state
        .chat()
        .open_room(user.id, body.peer_id, body.order_id)
        .await?;

    let view = state.store().read(|t| room_view(t, &room, user.id)).await;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(view)))
}

/// Room detail.
///
/// GET /api/chat/rooms/{id}
///
/// # Errors
///
/// Returns 403 for non-participants.
pub async fn show_room(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ChatRoomId>,
) -> Result<Json<RoomView>> {
    state
        .store()
        .read(|t| room_for(t, id, user.id).map(|r| room_view(t, r, user.id)))
        .await
        .map(Json)
}

/// Messages in a room, oldest first.
///
/// GET /api/chat/rooms/{id}/messages
///
/// # Errors
///
/// Returns 403 for non-participants.
pub async fn messages(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ChatRoomId>,
    Query(page): Query<Pagination>,
) -> Result<Json<Page<Message>>> {
    let mut messages: Vec<Message> = state
        .store()
        .read(|t| {
            room_for(t, id, user.id).map(|_| {
                t.all::<Message>()
                    .filter(|m| m.room_id == id)
                    .cloned()
                    .collect()
            })
        })
        .await?;

    messages.sort_by_key(|m| m.created_at);
    Ok(Json(page.paginate(messages)))
}

/// Send a message.
///
/// POST /api/chat/rooms/{id}/messages
///
/// # Errors
///
/// Returns 400 for an empty or oversized body, 403 for non-participants.
#[instrument(skip_all, fields(room_id = %id, user_id = %user.id))]
pub async fn post_message(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ChatRoomId>,
    Json(body): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    let message = state.chat().post_message(user.id, id, &body.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Mark the peer's messages as read.
///
/// POST /api/chat/rooms/{id}/read
///
/// # Errors
///
/// Returns 403 for non-participants.
pub async fn mark_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ChatRoomId>,
) -> Result<Json<CountResponse>> {
    let count = state.chat().mark_read(user.id, id).await?;
    Ok(Json(CountResponse { count }))
}
