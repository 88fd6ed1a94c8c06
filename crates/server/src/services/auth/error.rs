//! Authentication error types.

use thiserror::Error;

use tradepost_core::{EmailError, UserRole, UsernameError};

use crate::services::token::TokenError;
use crate::store::StoreError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Bearer token rejected.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("username already taken")]
    UsernameTaken,

    #[error("email already registered")]
    EmailTaken,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("invalid username: {0}")]
    InvalidUsername(#[from] UsernameError),

    /// Role that cannot be chosen at self-registration.
    #[error("role not allowed: {0}")]
    RoleNotAllowed(UserRole),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
