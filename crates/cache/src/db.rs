//! Database connection and pool management.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Cache lookups are short; a handful of connections covers every processor
// of a scan without contending on the single WAL writer.
const MAX_CONNECTIONS: u32 = 4;

/// Connection pool for the persistent cache database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to every pooled connection, not
            // only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the cache database at the given path.
    ///
    /// Creates the database file (and its parent directory) if it doesn't
    /// exist, and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
        }
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, None).await
    }

    /// Connect to an in-memory database.
    ///
    /// Not `#[cfg(test)]` so other crates can use it in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Each connection to ":memory:" is its own database; one connection
        // keeps every query looking at the same data.
        Self::new(options, Some(1)).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Several processors finishing objects at once all write here.
            .busy_timeout(Duration::from_millis(1500))
    }

    /// Apply PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -4096;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("performing cache database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.sqlite");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        db.close().await;
    }
}
