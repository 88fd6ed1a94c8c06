//! User management commands.
//!
//! Unlike `POST /api/auth/register`, this can create agents and admins.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `TRADEPOST_PASSWORD` - the new user's password; prompted on stdin when
//!   unset

use std::io::{BufRead, Write};

use secrecy::{ExposeSecret, SecretString};
use tradepost_core::{UserId, UserRole};
use tradepost_server::services::auth::{AuthService, NewUser};

use super::{CliError, database_url, open_store};

fn read_password() -> Result<SecretString, CliError> {
    if let Ok(password) = std::env::var("TRADEPOST_PASSWORD") {
        return Ok(SecretString::from(password));
    }

    let mut stderr = std::io::stderr();
    stderr.write_all(b"Password: ")?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(SecretString::from(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Create a user with any role.
///
/// # Errors
///
/// Returns an error for an unknown role, invalid input, a taken username or
/// email, or a database failure.
pub async fn create(
    username: &str,
    email: &str,
    role: &str,
    display_name: Option<&str>,
) -> Result<UserId, CliError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| CliError::InvalidRole(role.to_owned()))?;

    let url = database_url()?;
    let password = read_password()?;
    let store = open_store(&url).await?;

    tracing::info!("Creating user: {} ({})", username, role);

    let user = AuthService::new(&store)
        .create_user(NewUser {
            username,
            email,
            password: password.expose_secret(),
            display_name,
            role,
        })
        .await?;

    tracing::info!(
        "User created successfully! ID: {}, Username: {}, Role: {}",
        user.id,
        user.username,
        user.role
    );
    Ok(user.id)
}
