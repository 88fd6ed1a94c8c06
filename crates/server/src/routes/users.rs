//! User management.

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use tradepost_core::{Email, UserId, UserRole};

use crate::error::{AppError, Result, Validator};
use crate::extract::{Json, Page, Pagination, Path, Query};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{Notification, User, UserView};
use crate::services::auth::AuthError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

/// List users, newest first.
///
/// GET /api/users
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(filter): Query<UserFilter>,
    Query(page): Query<Pagination>,
) -> Json<Page<UserView>> {
    let mut users: Vec<UserView> = state
        .store()
        .read(|t| {
            t.all::<User>()
                .filter(|u| filter.role.is_none_or(|role| u.role == role))
                .map(|u| u.view(true))
                .collect()
        })
        .await;
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(page.paginate(users))
}

/// Public profile; the email is included for the user and for admins.
///
/// GET /api/users/{id}
///
/// # Errors
///
/// Returns 404 if the user does not exist.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(viewer): RequireAuth,
    Path(id): Path<UserId>,
) -> Result<Json<UserView>> {
    let include_email = viewer.id == id || viewer.role.is_admin();
    state
        .store()
        .read(|t| t.get::<User>(id).map(|u| u.view(include_email)))
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("User"))
}

/// Update display name or email.
///
/// PUT /api/users/{id}
///
/// # Errors
///
/// Returns 403 unless acting on yourself or as admin, 409 if the email
/// belongs to another account.
#[instrument(skip_all, fields(user_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(actor): RequireAuth,
    Path(id): Path<UserId>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<UserView>> {
    if actor.id != id && !actor.role.is_admin() {
        return Err(AppError::forbidden());
    }

    let mut v = Validator::new();
    if let Some(name) = &body.display_name {
        v.length(name, "display_name", 1, 100);
    }
    let email = body
        .email
        .as_deref()
        .and_then(|raw| v.parse(Email::parse(raw), "email"));
    v.finish()?;

    let user = state
        .store()
        .write(|tx| {
            if tx.get::<User>(id).is_none() {
                return Err(AppError::not_found("User"));
            }
            let email_taken = email.as_ref().is_some_and(|email| {
                tx.tables()
                    .all::<User>()
                    .any(|u| u.id != id && &u.email == email)
            });
            if email_taken {
                return Err(AuthError::EmailTaken.into());
            }

            let updated = tx.update::<User>(id, |u| {
                if let Some(name) = &body.display_name {
                    u.display_name = name.trim().to_string();
                }
                if let Some(email) = email.clone() {
                    u.email = email;
                }
                u.updated_at = Utc::now();
            });
            updated
                .cloned()
                .ok_or_else(|| AppError::not_found("User"))
        })
        .await?;

    Ok(Json(user.view(true)))
}

/// Change a user's role.
///
/// PUT /api/users/{id}/role
///
/// # Errors
///
/// Returns 400 when changing your own role.
#[instrument(skip_all, fields(user_id = %id, role = %body.role))]
pub async fn set_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<UserView>> {
    if admin.id == id {
        return Err(AppError::BadRequest(
            "Admins cannot change their own role".to_string(),
        ));
    }

    let user = state
        .store()
        .write(|tx| {
            tx.update::<User>(id, |u| {
                u.role = body.role;
                u.updated_at = Utc::now();
            })
            .cloned()
            .ok_or_else(|| AppError::not_found("User"))
        })
        .await?;

    tracing::info!(user_id = %id, role = %user.role, "Role changed");
    Ok(Json(user.view(true)))
}

/// Delete an account and its notifications.
///
/// DELETE /api/users/{id}
///
/// # Errors
///
/// Returns 400 when deleting yourself, 404 for an unknown user.
#[instrument(skip_all, fields(user_id = %id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<StatusCode> {
    if admin.id == id {
        return Err(AppError::BadRequest(
            "Admins cannot delete themselves".to_string(),
        ));
    }

    state
        .store()
        .write(|tx| {
            tx.remove::<User>(id)
                .ok_or_else(|| AppError::not_found("User"))?;
            tx.remove_where::<Notification>(|n| n.user_id == id);
            Ok::<_, AppError>(())
        })
        .await?;

    // Tokens are re-checked per request; open sockets must be cut here.
    state.hub().disconnect_user(id);
    tracing::info!(user_id = %id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
