//! Registration, login, and the current user.

use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tradepost_core::UserRole;

use crate::error::{Result, Validator};
use crate::extract::Json;
use crate::middleware::RequireAuth;
use crate::models::UserView;
use crate::services::auth::NewUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// Token plus the account it belongs to.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

/// Create an account.
///
/// POST /api/auth/register
///
/// # Errors
///
/// Returns 400 for invalid input or a staff role, 409 for a taken
/// username or email.
#[instrument(skip_all, fields(username = %body.username))]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let mut v = Validator::new();
    if let Some(name) = &body.display_name {
        v.length(name, "display_name", 0, 100);
    }
    v.finish()?;

    let user = state
        .auth()
        .register(NewUser {
            username: &body.username,
            email: &body.email,
            password: &body.password,
            display_name: body.display_name.as_deref(),
            role: body.role,
        })
        .await?;

    let token = state.tokens().issue(user.id, user.role)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.view(true),
        }),
    ))
}

/// Exchange a username (or email) and password for a token.
///
/// POST /api/auth/login
///
/// # Errors
///
/// Returns 401 for unknown users and wrong passwords alike.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let identifier = body.username.as_deref().or(body.email.as_deref()).unwrap_or("");

    let mut v = Validator::new();
    v.check(!identifier.trim().is_empty(), "username", "username or email is required");
    v.check(!body.password.is_empty(), "password", "is required");
    v.finish()?;

    let user = state.auth().login(identifier, &body.password).await?;
    let token = state.tokens().issue(user.id, user.role)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        token,
        user: user.view(true),
    }))
}

/// The authenticated user.
///
/// GET /api/auth/me
pub async fn me(RequireAuth(user): RequireAuth) -> Json<UserView> {
    Json(user.view(true))
}
