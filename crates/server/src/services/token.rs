//! Signed bearer tokens.
//!
//! Format: `base64url(claims_json).hex(hmac_sha256(secret, base64url(claims_json)))`.
//! The signature covers the encoded payload exactly as sent, so no
//! canonical JSON form is needed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use tradepost_core::{UserId, UserRole};

type HmacSha256 = Hmac<Sha256>;

/// Errors verifying or issuing a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("signing key rejected")]
    Key,
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    /// Role at issue time. Informational only; authorization re-reads the
    /// user's current role from the store.
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies tokens with one secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: SecretString,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: SecretString, ttl: std::time::Duration) -> Self {
        Self {
            secret,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Issue a token for `user` valid for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Key` if the MAC cannot be keyed.
    pub fn issue(&self, user: UserId, role: UserRole) -> Result<String, TokenError> {
        self.issue_at(user, role, Utc::now())
    }

    fn issue_at(
        &self,
        user: UserId,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user,
            role,
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
                .timestamp(),
        };
        let json = serde_json::to_vec(&claims).map_err(|_| TokenError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Malformed` if the token cannot be decoded,
    /// `TokenError::BadSignature` if the MAC does not match, and
    /// `TokenError::Expired` once `exp` has passed.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (payload, signature) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::Key)
    }
}
