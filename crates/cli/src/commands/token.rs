//! Token commands.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `JWT_SECRET` - the server's signing secret
//! - `TOKEN_TTL_HOURS` - lifetime of the issued token (default 24)

use tradepost_server::config::ServerConfig;
use tradepost_server::services::auth::AuthService;
use tradepost_server::services::token::TokenSigner;

use super::{CliError, database_url, open_store};

/// Print a bearer token for an existing user.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete or the user does
/// not exist.
pub async fn issue(username: &str) -> Result<(), CliError> {
    let config = ServerConfig::from_env()?;
    let url = config.database_url.clone().map_or_else(database_url, Ok)?;
    let store = open_store(&url).await?;

    let user = AuthService::new(&store)
        .find_by_username(username)
        .await
        .ok_or_else(|| CliError::UnknownUser(username.to_owned()))?;

    let signer = TokenSigner::new(config.jwt_secret, config.token_ttl);
    let token = signer.issue(user.id, user.role)?;

    tracing::info!(
        "Token issued for {} ({}), valid for {} hours",
        user.username,
        user.role,
        config.token_ttl.as_secs() / 3600
    );

    #[allow(clippy::print_stdout)]
    {
        println!("{token}");
    }
    Ok(())
}
