use anyhow::{Context as _, Result};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions as _, SqlitePool};
use std::{path::Path, str::FromStr};

use crate::tasks::model::UserSummary;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
pub(crate) async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, sqlx::Error> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(sqlx::Error::PoolTimedOut),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

impl From<UserRow> for UserSummary {
    fn from(r: UserRow) -> UserSummary {
        UserSummary {
            id: r.id,
            name: r.name,
            email: r.email,
        }
    }
}

/// Owner of the SQLite connection pool. Store components clone the pool out
/// of this and share the same database file.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding
    /// it are logged at WARN level. Set to 0 to disable.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("tasksync.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ─── User profiles ──────────────────────────────────────────────────────

    /// Insert or refresh a user's display profile.
    pub async fn upsert_user(
        &self,
        id: &str,
        name: &str,
        email: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, name, email) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, email = excluded.email",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserSummary>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Display name for a user id, falling back to the bare id when no
    /// profile exists. Used when composing notification messages.
    pub async fn display_name(&self, id: &str) -> String {
        match self.get_user(id).await {
            Ok(Some(user)) => user.name,
            _ => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_with_slow_query_logging_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new_with_slow_query(dir.path(), 100).await.unwrap();

        storage.upsert_user("u-a", "Alice", None).await.unwrap();
        let user = storage.get_user("u-a").await.unwrap().unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(storage.display_name("missing").await, "missing");
    }
}
