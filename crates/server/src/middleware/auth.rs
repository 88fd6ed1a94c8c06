//! Bearer token extractors.
//!
//! Every extractor verifies the token and then re-reads the user from the
//! store, so deleted accounts lose access immediately and role changes take
//! effect on the next request.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};

use crate::error::{AppError, set_sentry_user};
use crate::models::User;
use crate::state::AppState;

/// Extractor that requires a valid bearer token.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(RequireAuth(user): RequireAuth) -> Json<UserView> {
///     Json(user.view(true))
/// }
/// ```
pub struct RequireAuth(pub User);

/// Extractor that requires an agent or admin.
pub struct RequireStaff(pub User);

/// Extractor that requires an admin.
pub struct RequireAdmin(pub User);

/// The token from an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// Resolve a token to the user it was issued for.
///
/// # Errors
///
/// Returns `Auth(Token(_))` for a bad token and `Unauthorized` if the user
/// no longer exists.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state.tokens().verify(token)?;

    let user = state
        .store()
        .read(|t| t.get::<User>(claims.sub).cloned())
        .await
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;

    set_sentry_user(&user.id, user.username.as_str());
    tracing::Span::current().record("user_id", tracing::field::display(user.id));

    Ok(user)
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        authenticate(state, token).await.map(Self)
    }
}

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.role.is_staff() {
            return Err(AppError::Forbidden("Staff access required".to_string()));
        }
        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn headers(header: Option<&str>) -> HeaderMap {
        let mut builder = Request::builder().uri("/api/auth/me");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0.headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&headers(Some("bearer  abc "))), Some("abc"));
        assert_eq!(bearer_token(&headers(Some("Basic dXNlcg=="))), None);
        assert_eq!(bearer_token(&headers(Some("Bearer "))), None);
        assert_eq!(bearer_token(&headers(None)), None);
    }
}
