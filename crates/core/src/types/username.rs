//! Login name type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Username`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    #[error("username must be between {min} and {max} characters")]
    Length { min: usize, max: usize },
    #[error("username may only contain letters, digits, '_', '-' and '.'")]
    InvalidCharacter,
}

/// A unique login name.
///
/// Usernames are compared case-insensitively, so they are stored lowercased.
///
/// ```
/// use tradepost_core::Username;
///
/// assert_eq!(Username::parse("Acme_Supply").unwrap().as_str(), "acme_supply");
/// assert!(Username::parse("ab").is_err());
/// assert!(Username::parse("has space").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub const MIN_LENGTH: usize = 3;
    pub const MAX_LENGTH: usize = 32;

    /// Parse and normalize a username.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is outside 3-32 characters or the input
    /// contains anything other than ASCII letters, digits, `_`, `-` or `.`.
    pub fn parse(s: &str) -> Result<Self, UsernameError> {
        let s = s.trim();
        if s.len() < Self::MIN_LENGTH || s.len() > Self::MAX_LENGTH {
            return Err(UsernameError::Length {
                min: Self::MIN_LENGTH,
                max: Self::MAX_LENGTH,
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(UsernameError::InvalidCharacter);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bounds() {
        assert!(Username::parse("abc").is_ok());
        assert!(Username::parse(&"a".repeat(32)).is_ok());
        assert!(matches!(
            Username::parse(&"a".repeat(33)),
            Err(UsernameError::Length { .. })
        ));
    }

    #[test]
    fn test_rejects_non_ascii() {
        assert_eq!(
            Username::parse("café"),
            Err(UsernameError::InvalidCharacter)
        );
    }
}
