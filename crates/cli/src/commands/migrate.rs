//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! tp-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! `crates/server/migrations/`. The server never migrates on startup.

use super::{CliError, database_url};

/// Run the server's migrations against `DATABASE_URL`.
///
/// # Errors
///
/// Returns an error if `DATABASE_URL` is unset, the database is
/// unreachable, or a migration fails.
pub async fn run() -> Result<(), CliError> {
    let url = database_url()?;

    tracing::info!("Connecting to database...");
    let pool = tradepost_server::store::create_pool(&url).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
