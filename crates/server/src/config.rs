//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `JWT_SECRET` - Token signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `DATABASE_URL` - `PostgreSQL` connection string; without it the store is memory-only
//! - `TRADEPOST_HOST` - Bind address (default: 127.0.0.1)
//! - `TRADEPOST_PORT` - Listen port (default: 3000)
//! - `TOKEN_TTL_HOURS` - Bearer token lifetime (default: 24)
//! - `CORS_ALLOWED_ORIGINS` - Comma-separated origins (default: any)
//! - `AUTH_RATE_LIMIT` - Rate limit login/register per IP (default: true)
//! - `WS_CHANNEL_CAPACITY` - Outbound queue per WebSocket connection (default: 64)
//! - `LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Bearer token signing secret
    pub jwt_secret: SecretString,
    /// How long issued tokens stay valid
    pub token_ttl: Duration,
    /// Allowed CORS origins; empty means any origin
    pub cors_allowed_origins: Vec<String>,
    /// Whether auth endpoints are rate limited per client IP
    pub auth_rate_limit: bool,
    /// Outbound message queue length per WebSocket connection
    pub ws_channel_capacity: usize,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("auth_rate_limit", &self.auth_rate_limit)
            .field("ws_channel_capacity", &self.ws_channel_capacity)
            .field("log_format", &self.log_format)
            .field("sentry_dsn", &self.sentry_dsn)
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;
    pub const DEFAULT_WS_CHANNEL_CAPACITY: usize = 64;

    /// In-memory configuration with defaults for everything but the secret.
    ///
    /// The secret is not strength-checked here; `from_env` does that for
    /// deployed configurations.
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            database_url: None,
            host: IpAddr::from([127, 0, 0, 1]),
            port: Self::DEFAULT_PORT,
            jwt_secret,
            token_ttl: Duration::from_secs(Self::DEFAULT_TOKEN_TTL_HOURS * 3600),
            cors_allowed_origins: Vec::new(),
            auth_rate_limit: true,
            ws_channel_capacity: Self::DEFAULT_WS_CHANNEL_CAPACITY,
            log_format: LogFormat::Pretty,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the signing secret fails validation (length, placeholder detection,
    /// entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let jwt_secret = get_validated_secret("JWT_SECRET")?;
        let mut config = Self::new(jwt_secret);

        config.database_url = get_optional_env("DATABASE_URL").map(SecretString::from);
        config.host = parse_env_or_default("TRADEPOST_HOST", config.host)?;
        config.port = parse_env_or_default("TRADEPOST_PORT", config.port)?;

        let ttl_hours: u64 = parse_env_or_default("TOKEN_TTL_HOURS", Self::DEFAULT_TOKEN_TTL_HOURS)?;
        if ttl_hours == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "TOKEN_TTL_HOURS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        config.token_ttl = Duration::from_secs(ttl_hours * 3600);

        config.cors_allowed_origins = get_optional_env("CORS_ALLOWED_ORIGINS")
            .map(|origins| parse_origin_list(&origins))
            .unwrap_or_default();
        config.auth_rate_limit = parse_env_or_default("AUTH_RATE_LIMIT", true)?;

        config.ws_channel_capacity =
            parse_env_or_default("WS_CHANNEL_CAPACITY", Self::DEFAULT_WS_CHANNEL_CAPACITY)?;
        if config.ws_channel_capacity == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "WS_CHANNEL_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        config.log_format = match get_env_or_default("LOG_FORMAT", "pretty").as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "LOG_FORMAT".to_string(),
                    format!("expected 'pretty' or 'json', got '{other}'"),
                ));
            }
        };

        config.sentry_dsn = get_optional_env("SENTRY_DSN");
        config.sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(config)
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is long enough, not a placeholder, and has
/// sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SECRET_LENGTH,
                secret.len()
            ),
        ));
    }

    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (randomly generated secrets have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

/// Check a secret without loading it from the environment.
///
/// # Errors
///
/// Returns `ConfigError::InsecureSecret` on the same rules `from_env` applies.
pub fn check_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    validate_secret_strength(secret.expose_secret(), var_name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_too_short() {
        let result = validate_secret_strength("aB3$xY9!", "JWT_SECRET");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_placeholder() {
        let result = validate_secret_strength("your-jwt-signing-key-goes-right-here", "JWT_SECRET");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_low_entropy() {
        let result = validate_secret_strength(&"ab".repeat(20), "JWT_SECRET");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%", "JWT_SECRET");
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_origin_list() {
        assert_eq!(
            parse_origin_list(" http://a.test , ,https://b.test"),
            vec!["http://a.test".to_string(), "https://b.test".to_string()]
        );
    }

    #[test]
    fn test_new_defaults() {
        let config = ServerConfig::new(SecretString::from("x".repeat(32)));
        assert!(config.database_url.is_none());
        assert_eq!(config.token_ttl, Duration::from_secs(24 * 3600));
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = ServerConfig::new(SecretString::from("super-hidden-signing-key-value-1234"));
        config.database_url = Some(SecretString::from("postgres://user:hunter2@db/app"));

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-hidden-signing-key"));
        assert!(!debug_output.contains("hunter2"));
    }
}
