//! WebSocket frames.
//!
//! Every frame is a JSON text message with a snake_case `type` tag.

use serde::{Deserialize, Serialize};

use tradepost_core::{ChatRoomId, UserId};

use crate::models::{Message, Notification};

/// Server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First frame after connecting.
    Hello {
        user_id: UserId,
        unread_notifications: usize,
    },
    Pong,
    Notification(Notification),
    ChatMessage(Message),
    /// The reader marked `count` messages in the room as read.
    MessagesRead {
        room_id: ChatRoomId,
        reader_id: UserId,
        count: usize,
    },
    Typing {
        room_id: ChatRoomId,
        user_id: UserId,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Tag for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Pong => "pong",
            Self::Notification(_) => "notification",
            Self::ChatMessage(_) => "chat_message",
            Self::MessagesRead { .. } => "messages_read",
            Self::Typing { .. } => "typing",
            Self::Error { .. } => "error",
        }
    }
}

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Ping,
    SendMessage { room_id: ChatRoomId, body: String },
    MarkRead { room_id: ChatRoomId },
    Typing { room_id: ChatRoomId },
}
