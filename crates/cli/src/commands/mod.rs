//! Subcommand implementations.

pub mod migrate;
pub mod token;
pub mod user;

use secrecy::SecretString;
use thiserror::Error;

use tradepost_server::config::ConfigError;
use tradepost_server::services::auth::AuthError;
use tradepost_server::services::token::TokenError;
use tradepost_server::store::{Backend, Store, StoreError, create_pool};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: customer, seller, agent, admin")]
    InvalidRole(String),

    #[error("No user named {0}")]
    UnknownUser(String),

    #[error("Could not read password: {0}")]
    Io(#[from] std::io::Error),
}

/// `DATABASE_URL`, required by every command that touches records.
fn database_url() -> Result<SecretString, CliError> {
    std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| CliError::MissingEnvVar("DATABASE_URL"))
}

/// Open the same write-through store the server uses.
async fn open_store(url: &SecretString) -> Result<Store, CliError> {
    tracing::info!("Connecting to database...");
    let pool = create_pool(url).await?;
    Ok(Store::open(Backend::Postgres(pool)).await?)
}
