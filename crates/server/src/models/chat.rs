//! Two-party chat rooms and their messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradepost_core::{ChatRoomId, MessageId, OrderId, UserId};

/// A conversation between exactly two users, optionally about an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: ChatRoomId,
    /// Sorted, so a pair maps to one room regardless of who opened it.
    pub participants: [UserId; 2],
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ChatRoom {
    #[must_use]
    pub fn new(a: UserId, b: UserId, order_id: Option<OrderId>) -> Self {
        let now = Utc::now();
        Self {
            id: ChatRoomId::new(),
            participants: Self::pair(a, b),
            order_id,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Canonical ordering of a participant pair.
    #[must_use]
    pub fn pair(a: UserId, b: UserId) -> [UserId; 2] {
        if a <= b { [a, b] } else { [b, a] }
    }

    #[must_use]
    pub fn includes(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// The other participant, or `None` if `user` is not in the room.
    #[must_use]
    pub fn peer_of(&self, user: UserId) -> Option<UserId> {
        match self.participants {
            [a, b] if a == user => Some(b),
            [a, b] if b == user => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: ChatRoomId,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}
