//! The caller's notification inbox.

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use tradepost_core::NotificationId;

use crate::error::{AppError, Result};
use crate::extract::{Json, Page, Pagination, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::Notification;
use crate::routes::chat::CountResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread: bool,
}

/// Own notifications, newest first.
///
/// GET /api/notifications
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(filter): Query<NotificationFilter>,
    Query(page): Query<Pagination>,
) -> Json<Page<Notification>> {
    let mut notifications: Vec<Notification> = state
        .store()
        .read(|t| {
            t.all::<Notification>()
                .filter(|n| n.user_id == user.id)
                .filter(|n| !filter.unread || !n.read)
                .cloned()
                .collect()
        })
        .await;

    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(page.paginate(notifications))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Json<CountResponse> {
    let count = state
        .store()
        .read(|t| {
            t.all::<Notification>()
                .filter(|n| n.user_id == user.id && !n.read)
                .count()
        })
        .await;
    Json(CountResponse { count })
}

/// Mark one notification read.
///
/// POST /api/notifications/{id}/read
///
/// # Errors
///
/// Returns 404 for a notification that is not the caller's.
pub async fn mark_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>> {
    state
        .store()
        .write(|tx| {
            // Other users' notifications are reported as missing.
            if tx.get::<Notification>(id).is_none_or(|n| n.user_id != user.id) {
                return Err(AppError::not_found("Notification"));
            }
            tx.update::<Notification>(id, |n| n.read = true)
                .cloned()
                .ok_or_else(|| AppError::not_found("Notification"))
        })
        .await
        .map(Json)
}

/// Mark everything read. Returns how many changed.
///
/// POST /api/notifications/read-all
///
/// # Errors
///
/// Returns 500 if the change cannot be persisted.
pub async fn read_all(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CountResponse>> {
    let count = state
        .store()
        .write(|tx| {
            let unread: Vec<NotificationId> = tx
                .tables()
                .all::<Notification>()
                .filter(|n| n.user_id == user.id && !n.read)
                .map(|n| n.id)
                .collect();
            for id in &unread {
                tx.update::<Notification>(*id, |n| n.read = true);
            }
            Ok::<_, AppError>(unread.len())
        })
        .await?;

    tracing::debug!(user_id = %user.id, count, "Notifications marked read");
    Ok(Json(CountResponse { count }))
}

/// DELETE /api/notifications/{id}
///
/// # Errors
///
/// Returns 404 for a notification that is not the caller's.
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<NotificationId>,
) -> Result<StatusCode> {
    state
        .store()
        .write(|tx| {
            if tx.get::<Notification>(id).is_none_or(|n| n.user_id != user.id) {
                return Err(AppError::not_found("Notification"));
            }
            tx.remove::<Notification>(id);
            Ok(())
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
