//! Persistence backends for the record store.
//!
//! # Database
//!
//! One table holds every record as JSON:
//!
//! - `records(kind, id, body, updated_at)` - primary key `(kind, id)`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p tradepost-cli -- migrate
//! ```

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::StoreError;

/// One net change produced by a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Upsert {
        kind: &'static str,
        id: Uuid,
        body: serde_json::Value,
    },
    Delete {
        kind: &'static str,
        id: Uuid,
    },
}

/// Where committed records go.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Nothing is persisted; state is lost on restart.
    Memory,
    /// Write-through to `PostgreSQL`.
    Postgres(PgPool),
}

impl Backend {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres(_) => "postgres",
        }
    }

    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        matches!(self, Self::Postgres(_))
    }

    /// Every stored `(kind, body)` pair.
    pub(super) async fn load(&self) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
        let Self::Postgres(pool) = self else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query("SELECT kind, body FROM records ORDER BY updated_at")
            .fetch_all(pool)
            .await?;

        rows.into_iter()
            .map(|row| Ok((row.try_get("kind")?, row.try_get("body")?)))
            .collect()
    }

    /// Apply a transaction's changes atomically.
    pub(super) async fn persist(&self, changes: &[Change]) -> Result<(), StoreError> {
        let Self::Postgres(pool) = self else {
            return Ok(());
        };
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await?;
        for change in changes {
            match change {
                Change::Upsert { kind, id, body } => {
                    sqlx::query(
                        r"
                        INSERT INTO records (kind, id, body, updated_at)
                        VALUES ($1, $2, $3, NOW())
                        ON CONFLICT (kind, id)
                        DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
                        ",
                    )
                    .bind(*kind)
                    .bind(id)
                    .bind(body)
                    .execute(&mut *tx)
                    .await?;
                }
                Change::Delete { kind, id } => {
                    sqlx::query("DELETE FROM records WHERE kind = $1 AND id = $2")
                        .bind(*kind)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;

        tracing::debug!(changes = changes.len(), "Persisted transaction");
        Ok(())
    }

    /// Whether the backend is reachable.
    pub async fn ping(&self) -> bool {
        match self {
            Self::Memory => true,
            Self::Postgres(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_is_inert() {
        let backend = Backend::Memory;
        assert!(!backend.is_persistent());
        assert!(backend.ping().await);
        assert!(backend.load().await.is_ok_and(|rows| rows.is_empty()));
        let change = Change::Delete {
            kind: "user",
            id: Uuid::new_v4(),
        };
        assert!(backend.persist(&[change]).await.is_ok());
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a migrated database"]
    async fn test_postgres_round_trip() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let Ok(pool) = create_pool(&url.into()).await else {
            return;
        };
        let backend = Backend::Postgres(pool);
        let id = Uuid::new_v4();

        let upsert = Change::Upsert {
            kind: "sample",
            id,
            body: serde_json::json!({ "id": id }),
        };
        assert!(backend.persist(&[upsert]).await.is_ok());
        let rows = backend.load().await.unwrap_or_default();
        assert!(rows.iter().any(|(kind, _)| kind == "sample"));

        let delete = Change::Delete { kind: "sample", id };
        assert!(backend.persist(&[delete]).await.is_ok());
    }
}
