//! Notification fan-out.
//!
//! A notification is first stored for each recipient, then pushed to the
//! recipient's open sockets. Storing happens inside the caller's write
//! transaction via [`stage`] so the notification commits (or rolls back)
//! with the change it describes; pushing happens after commit via
//! [`Notifier::deliver`]. Push failures are logged by the hub and never
//! surface to the caller.

use std::collections::BTreeSet;

use chrono::Utc;

use tradepost_core::{NotificationId, NotificationKind, UserId};

use crate::models::Notification;
use crate::realtime::{Hub, ServerEvent};
use crate::store::Txn;

/// Content of a notification, before it is addressed.
#[derive(Debug, Clone)]
pub struct Draft {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl Draft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Store one notification per distinct recipient inside `tx`.
pub fn stage(
    tx: &mut Txn<'_>,
    users: impl IntoIterator<Item = UserId>,
    draft: &Draft,
) -> Vec<Notification> {
    let recipients: BTreeSet<UserId> = users.into_iter().collect();
    let now = Utc::now();

    recipients
        .into_iter()
        .map(|user_id| {
            let notification = Notification {
                id: NotificationId::new(),
                user_id,
                kind: draft.kind,
                title: draft.title.clone(),
                body: draft.body.clone(),
                data: draft.data.clone(),
                read: false,
                created_at: now,
            };
            tx.put(notification.clone());
            notification
        })
        .collect()
}

/// Pushes stored notifications to open sockets.
pub struct Notifier<'a> {
    hub: &'a Hub,
}

impl<'a> Notifier<'a> {
    #[must_use]
    pub const fn new(hub: &'a Hub) -> Self {
        Self { hub }
    }

    /// Push already-stored notifications to their recipients' sockets.
    pub fn deliver(&self, notifications: &[Notification]) {
        for notification in notifications {
            let pushed = self.hub.send_to_user(
                notification.user_id,
                &ServerEvent::Notification(notification.clone()),
            );
            tracing::debug!(
                user_id = %notification.user_id,
                kind = %notification.kind,
                sockets = pushed,
                "Notification delivered"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreError};

    #[tokio::test]
    async fn test_stage_dedups_then_deliver_pushes() {
        let store = Store::memory();
        let hub = Hub::new(4);
        let online = UserId::new();
        let offline = UserId::new();
        let (_, mut rx) = hub.register(online);

        let draft = Draft::new(NotificationKind::TicketCreated, "New ticket", "Printer on fire")
            .with_data(serde_json::json!({ "ticket_id": "t-1" }));
        let sent = store
            .write(|tx| Ok::<_, StoreError>(stage(tx, [online, offline, online], &draft)))
            .await
            .unwrap();
        Notifier::new(&hub).deliver(&sent);

        assert_eq!(sent.len(), 2);
        assert_eq!(store.read(|t| t.notifications.len()).await, 2);

        let Some(ServerEvent::Notification(pushed)) = rx.recv().await else {
            panic!("expected a notification frame");
        };
        assert_eq!(pushed.user_id, online);
        assert_eq!(pushed.data["ticket_id"], "t-1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_staged_notifications_roll_back_with_txn() {
        let store = Store::memory();
        let draft = Draft::new(NotificationKind::LowStock, "Low stock", "");

        let result: Result<(), StoreError> = store
            .write(|tx| {
                stage(tx, [UserId::new()], &draft);
                Err(StoreError::DataCorruption("abort".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.read(|t| t.notifications.len()).await, 0);
    }
}
