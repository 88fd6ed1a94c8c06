//! Chat operations shared by the REST routes and the WebSocket loop.

use chrono::Utc;

use tradepost_core::{ChatRoomId, MessageId, NotificationKind, OrderId, UserId};

use crate::error::{AppError, Result, Validator};
use crate::models::{ChatRoom, Message, User};
use crate::realtime::{Hub, ServerEvent};
use crate::services::notifier::{self, Draft, Notifier};
use crate::store::{Store, Tables};

/// Maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Length of the message preview placed in notifications.
const PREVIEW_LENGTH: usize = 80;

pub struct ChatService<'a> {
    store: &'a Store,
    hub: &'a Hub,
}

/// Look up a room the user participates in.
///
/// # Errors
///
/// Returns `Unauthorized` if `user` no longer exists, `NotFound` if the
/// room does not exist, and `Forbidden` if `user` is not a participant.
pub fn room_for<'t>(tables: &'t Tables, room_id: ChatRoomId, user: UserId) -> Result<&'t ChatRoom> {
    ensure_account(tables, user)?;
    let room = tables
        .get::<ChatRoom>(room_id)
        .ok_or_else(|| AppError::not_found("Chat room"))?;
    if !room.includes(user) {
        return Err(AppError::forbidden());
    }
    Ok(room)
}

/// Sockets authenticate once at upgrade, so commands arriving later check
/// that the account still exists.
fn ensure_account(tables: &Tables, user: UserId) -> Result<()> {
    if tables.get::<User>(user).is_none() {
        return Err(AppError::Unauthorized("Account no longer exists".to_string()));
    }
    Ok(())
}

/// Get the room for a pair (and order), creating it inside `tx` if needed.
pub fn ensure_room(
    tx: &mut crate::store::Txn<'_>,
    a: UserId,
    b: UserId,
    order_id: Option<OrderId>,
) -> ChatRoom {
    let pair = ChatRoom::pair(a, b);
    if let Some(existing) = tx
        .tables()
        .all::<ChatRoom>()
        .find(|r| r.participants == pair && r.order_id == order_id)
    {
        return existing.clone();
    }
    let room = ChatRoom::new(a, b, order_id);
    tx.put(room.clone());
    room
}

impl<'a> ChatService<'a> {
    #[must_use]
    pub const fn new(store: &'a Store, hub: &'a Hub) -> Self {
        Self { store, hub }
    }

    /// Get or create the room between `user` and `peer`.
    ///
    /// Returns the room and whether it was created.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` when chatting with yourself and `NotFound` for
    /// an unknown peer or order.
    pub async fn open_room(
        &self,
        user: UserId,
        peer: UserId,
        order_id: Option<OrderId>,
    ) -> Result<(ChatRoom, bool)> {
        if user == peer {
            return Err(AppError::BadRequest(
                "Cannot open a chat with yourself".to_string(),
            ));
        }

        self.store
            .write(|tx| {
                ensure_account(tx.tables(), user)?;
                if tx.get::<User>(peer).is_none() {
                    return Err(AppError::not_found("User"));
                }
                if let Some(order_id) = order_id {
                    let order = tx
                        .get::<crate::models::Order>(order_id)
                        .ok_or_else(|| AppError::not_found("Order"))?;
                    if !(order.involves(user) && order.involves(peer)) {
                        return Err(AppError::forbidden());
                    }
                }

                let before = tx.tables().rooms.len();
                let room = ensure_room(tx, user, peer, order_id);
                Ok((room, tx.tables().rooms.len() > before))
            })
            .await
    }

    /// Post a message, push it to both participants, and notify the peer.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty or oversized body, and the errors
    /// of [`room_for`].
    pub async fn post_message(
        &self,
        sender: UserId,
        room_id: ChatRoomId,
        body: &str,
    ) -> Result<Message> {
        let mut v = Validator::new();
        v.length(body, "body", 1, MAX_MESSAGE_LENGTH);
        v.finish()?;

        let (message, peer, notifications) = self
            .store
            .write(|tx| {
                let room = room_for(tx.tables(), room_id, sender)?;
                let peer = room.peer_of(sender).ok_or_else(AppError::forbidden)?;

                let now = Utc::now();
                let message = Message {
                    id: MessageId::new(),
                    room_id,
                    sender_id: sender,
                    body: body.trim().to_string(),
                    created_at: now,
                    read_at: None,
                };
                tx.put(message.clone());
                tx.update::<ChatRoom>(room_id, |r| r.last_activity_at = now);

                let sender_name = tx
                    .get::<User>(sender)
                    .map_or_else(String::new, |u| u.display_name.clone());
                let draft = Draft::new(
                    NotificationKind::NewMessage,
                    format!("New message from {sender_name}"),
                    preview(&message.body),
                )
                .with_data(serde_json::json!({
                    "room_id": room_id,
                    "message_id": message.id,
                }));
                let notifications = notifier::stage(tx, [peer], &draft);

                Ok::<_, AppError>((message, peer, notifications))
            })
            .await?;

        let event = ServerEvent::ChatMessage(message.clone());
        self.hub.send_to_users([sender, peer], &event);
        Notifier::new(self.hub).deliver(&notifications);

        tracing::debug!(room_id = %room_id, message_id = %message.id, "Message posted");
        Ok(message)
    }

    /// Mark the peer's unread messages in a room as read.
    ///
    /// Returns the number of messages marked.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`room_for`].
    pub async fn mark_read(&self, reader: UserId, room_id: ChatRoomId) -> Result<usize> {
        let (count, peer) = self
            .store
            .write(|tx| {
                let room = room_for(tx.tables(), room_id, reader)?;
                let peer = room.peer_of(reader);

                let unread: Vec<MessageId> = tx
                    .tables()
                    .all::<Message>()
                    .filter(|m| m.room_id == room_id && m.sender_id != reader && m.read_at.is_none())
                    .map(|m| m.id)
                    .collect();

                let now = Utc::now();
                for id in &unread {
                    tx.update::<Message>(*id, |m| m.read_at = Some(now));
                }
                Ok::<_, AppError>((unread.len(), peer))
            })
            .await?;

        if count > 0 {
            let event = ServerEvent::MessagesRead {
                room_id,
                reader_id: reader,
                count,
            };
            self.hub.send_to_users(std::iter::once(reader).chain(peer), &event);
        }

        Ok(count)
    }

    /// Relay a typing indicator to the peer.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`room_for`].
    pub async fn typing(&self, user: UserId, room_id: ChatRoomId) -> Result<()> {
        let peer = self
            .store
            .read(|t| room_for(t, room_id, user).map(|room| room.peer_of(user)))
            .await?;

        if let Some(peer) = peer {
            self.hub
                .send_to_user(peer, &ServerEvent::Typing { room_id, user_id: user });
        }
        Ok(())
    }
}

/// Unread messages in `room` for `user`.
#[must_use]
pub fn unread_count(tables: &Tables, room_id: ChatRoomId, user: UserId) -> usize {
    tables
        .all::<Message>()
        .filter(|m| m.room_id == room_id && m.sender_id != user && m.read_at.is_none())
        .count()
}

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_LENGTH).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tradepost_core::{Email, UserRole, Username};

    use super::*;
    use crate::store::StoreError;

    async fn seed_user(store: &Store, name: &str) -> UserId {
        let user = User {
            id: UserId::new(),
            username: Username::parse(name).unwrap(),
            email: Email::parse(&format!("{name}@example.com")).unwrap(),
            display_name: name.to_string(),
            role: UserRole::Customer,
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = user.id;
        store
            .write(|tx| {
                tx.put(user);
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_open_room_is_get_or_create() {
        let store = Store::memory();
        let hub = Hub::new(8);
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let chat = ChatService::new(&store, &hub);

        let (first, created) = chat.open_room(alice, bob, None).await.unwrap();
        assert!(created);
        let (second, created) = chat.open_room(bob, alice, None).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        assert!(matches!(
            chat.open_room(alice, alice, None).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_post_pushes_and_notifies() {
        let store = Store::memory();
        let hub = Hub::new(8);
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let chat = ChatService::new(&store, &hub);
        let (room, _) = chat.open_room(alice, bob, None).await.unwrap();
        let (_, mut bob_rx) = hub.register(bob);

        chat.post_message(alice, room.id, "  hello bob ").await.unwrap();

        let Some(ServerEvent::ChatMessage(message)) = bob_rx.recv().await else {
            panic!("expected chat message first");
        };
        assert_eq!(message.body, "hello bob");
        let Some(ServerEvent::Notification(notification)) = bob_rx.recv().await else {
            panic!("expected notification second");
        };
        assert_eq!(notification.kind, NotificationKind::NewMessage);

        assert_eq!(store.read(|t| unread_count(t, room.id, bob)).await, 1);
        assert_eq!(chat.mark_read(bob, room.id).await.unwrap(), 1);
        assert_eq!(chat.mark_read(bob, room.id).await.unwrap(), 0);
        assert_eq!(store.read(|t| unread_count(t, room.id, bob)).await, 0);
    }

    #[tokio::test]
    async fn test_outsiders_and_bad_bodies_rejected() {
        let store = Store::memory();
        let hub = Hub::new(8);
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let eve = seed_user(&store, "eve").await;
        let chat = ChatService::new(&store, &hub);
        let (room, _) = chat.open_room(alice, bob, None).await.unwrap();

        assert!(matches!(
            chat.post_message(eve, room.id, "hi").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            chat.post_message(alice, room.id, "   ").await,
            Err(AppError::Validation(_))
        ));
        let too_long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            chat.post_message(alice, room.id, &too_long).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            chat.post_message(alice, ChatRoomId::new(), "hi").await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(store.read(|t| t.messages.len()).await, 0);
    }

    #[tokio::test]
    async fn test_deleted_account_cannot_chat() {
        let store = Store::memory();
        let hub = Hub::new(8);
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let chat = ChatService::new(&store, &hub);
        let (room, _) = chat.open_room(alice, bob, None).await.unwrap();

        store
            .write(|tx| {
                tx.remove::<User>(alice);
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();

        assert!(matches!(
            chat.post_message(alice, room.id, "still here").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            chat.mark_read(alice, room.id).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            chat.typing(alice, room.id).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            chat.open_room(alice, bob, None).await,
            Err(AppError::Unauthorized(_))
        ));
        assert_eq!(store.read(|t| unread_count(t, room.id, bob)).await, 0);
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        let long = "a".repeat(100);
        assert_eq!(preview(&long).chars().count(), PREVIEW_LENGTH + 1);
    }
}
