//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradepost_core::{Email, UserId, UserRole, Username};

/// A registered account.
///
/// Never serialized into responses directly; use [`User::view`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: Email,
    pub display_name: String,
    pub role: UserRole,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public representation of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub username: Username,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
    pub display_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Response view; the email is only included for the user themselves
    /// and for admins.
    #[must_use]
    pub fn view(&self, include_email: bool) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: include_email.then(|| self.email.clone()),
            display_name: self.display_name.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_view_never_leaks_hash() {
        let user = User {
            id: UserId::new(),
            username: Username::parse("alice").unwrap(),
            email: Email::parse("alice@example.com").unwrap(),
            display_name: "Alice".to_string(),
            role: UserRole::Seller,
            password_hash: "$argon2id$secret".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let public = serde_json::to_value(user.view(false)).unwrap();
        assert!(public.get("email").is_none());
        assert!(public.get("password_hash").is_none());

        let own = serde_json::to_value(user.view(true)).unwrap();
        assert_eq!(own["email"], "alice@example.com");
        assert_eq!(own["role"], "seller");
    }
}
