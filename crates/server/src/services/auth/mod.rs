//! Authentication service.
//!
//! Password registration and login against the record store. Bearer tokens
//! are handled by [`crate::services::token`].

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;

use tradepost_core::{Email, UserId, UserRole, Username};

use crate::models::User;
use crate::store::Store;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length, bounding hashing cost.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub display_name: Option<&'a str>,
    pub role: UserRole,
}

/// Authentication service.
///
/// Handles user registration and login.
pub struct AuthService<'a> {
    store: &'a Store,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Self-service registration. Only non-staff roles may be chosen.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RoleNotAllowed` for staff roles, and everything
    /// [`Self::create_user`] returns.
    pub async fn register(&self, input: NewUser<'_>) -> Result<User, AuthError> {
        if !input.role.self_assignable() {
            return Err(AuthError::RoleNotAllowed(input.role));
        }
        self.create_user(input).await
    }

    /// Create an account with any role. Used by admins and the CLI.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidUsername` / `AuthError::InvalidEmail` if
    /// either fails validation.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UsernameTaken` / `AuthError::EmailTaken` on duplicates.
    pub async fn create_user(&self, input: NewUser<'_>) -> Result<User, AuthError> {
        let username = Username::parse(input.username)?;
        let email = Email::parse(input.email)?;
        validate_password(input.password)?;

        let display_name = input
            .display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| username.as_str().to_string(), str::to_string);

        let password_hash = hash_password(input.password)?;
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            username,
            email,
            display_name,
            role: input.role,
            password_hash,
            created_at: now,
            updated_at: now,
        };

        self.store
            .write(|tx| {
                for existing in tx.tables().all::<User>() {
                    if existing.username == user.username {
                        return Err(AuthError::UsernameTaken);
                    }
                    if existing.email == user.email {
                        return Err(AuthError::EmailTaken);
                    }
                }
                tx.put(user.clone());
                Ok(())
            })
            .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User created");
        Ok(user)
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Login with a username or email and a password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if no user matches or the
    /// password is wrong; the caller cannot tell which.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let identifier = identifier.trim().to_lowercase();

        let user = self
            .store
            .read(|t| {
                t.all::<User>()
                    .find(|u| u.username.as_str() == identifier || u.email.as_str() == identifier)
                    .cloned()
            })
            .await
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &user.password_hash)?;

        Ok(user)
    }

    /// Look up a user by username.
    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        let username = username.trim().to_lowercase();
        self.store
            .read(|t| {
                t.all::<User>()
                    .find(|u| u.username.as_str() == username)
                    .cloned()
            })
            .await
    }
}

// =============================================================================
// Password helpers
// =============================================================================

/// Validate password strength.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` when the length is out of bounds.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_user<'a>(username: &'a str, email: &'a str, role: UserRole) -> NewUser<'a> {
        NewUser {
            username,
            email,
            password: "correct horse battery",
            display_name: None,
            role,
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let store = Store::memory();
        let auth = AuthService::new(&store);

        let user = auth
            .register(new_user("Alice", "alice@example.com", UserRole::Customer))
            .await
            .unwrap();
        assert_eq!(user.username.as_str(), "alice");
        assert_eq!(user.display_name, "alice");
        assert!(user.password_hash.starts_with("$argon2id$"));

        let by_name = auth.login("alice", "correct horse battery").await.unwrap();
        assert_eq!(by_name.id, user.id);
        let by_email = auth
            .login("ALICE@example.com", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let store = Store::memory();
        let auth = AuthService::new(&store);
        auth.register(new_user("alice", "alice@example.com", UserRole::Customer))
            .await
            .unwrap();

        assert!(matches!(
            auth.login("alice", "wrong password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody", "correct horse battery").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        let store = Store::memory();
        let auth = AuthService::new(&store);
        auth.register(new_user("alice", "alice@example.com", UserRole::Customer))
            .await
            .unwrap();

        assert!(matches!(
            auth.register(new_user("alice", "other@example.com", UserRole::Customer))
                .await,
            Err(AuthError::UsernameTaken)
        ));
        assert!(matches!(
            auth.register(new_user("alice2", "Alice@Example.com", UserRole::Seller))
                .await,
            Err(AuthError::EmailTaken)
        ));
        assert_eq!(store.read(|t| t.users.len()).await, 1);
    }

    #[tokio::test]
    async fn test_usernames_differ_only_by_case_collide() {
        let store = Store::memory();
        let auth = AuthService::new(&store);
        auth.register(new_user("alice", "alice@example.com", UserRole::Customer))
            .await
            .unwrap();

        assert!(matches!(
            auth.register(new_user("ALICE", "other@example.com", UserRole::Customer))
                .await,
            Err(AuthError::UsernameTaken)
        ));
        assert!(auth.find_by_username("Alice").await.is_some());
        assert!(auth.login("Alice", "correct horse battery").await.is_ok());
    }

    #[tokio::test]
    async fn test_staff_roles_need_create_user() {
        let store = Store::memory();
        let auth = AuthService::new(&store);

        assert!(matches!(
            auth.register(new_user("root", "root@example.com", UserRole::Admin))
                .await,
            Err(AuthError::RoleNotAllowed(UserRole::Admin))
        ));
        let admin = auth
            .create_user(new_user("root", "root@example.com", UserRole::Admin))
            .await
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);
    }

    #[test]
    fn test_validate_password() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("long enough").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }
}
