//! Stored notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradepost_core::{NotificationId, NotificationKind, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Ids of the related entities, for client-side linking.
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
