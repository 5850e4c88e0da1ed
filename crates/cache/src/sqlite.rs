//! Persistent cache backed by SQLite.

use crate::error::{ErrorKind, Result};
use crate::{CacheEntry, CacheKey, Database, RowCache, Schema};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(sqlx::FromRow)]
struct EntryRow {
    num_rows: Option<i64>,
    schema: Option<String>,
    last_modified: Option<i64>,
}
impl TryFrom<EntryRow> for CacheEntry {
    type Error = crate::error::Error;
    fn try_from(row: EntryRow) -> Result<Self> {
        let num_rows = row
            .num_rows
            .map(u64::try_from)
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("num_rows"))?;
        let schema = row
            .schema
            .map(|json| serde_json::from_str::<Schema>(&json))
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("schema"))?;
        let last_modified = row
            .last_modified
            .map(|nanos| OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)))
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("last_modified"))?;
        Ok(CacheEntry {
            num_rows,
            schema,
            last_modified,
        })
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// [`RowCache`] that survives restarts.
///
/// Nothing expires on its own; call [`prune_older_than`](Self::prune_older_than)
/// or [`clear`](Self::clear) to bound staleness.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    db: Database,
}

impl From<Database> for SqliteCache {
    fn from(db: Database) -> Self {
        Self { db }
    }
}

impl SqliteCache {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from(Database::connect(path).await?))
    }

    pub async fn in_memory() -> Result<Self> {
        Ok(Self::from(Database::connect_in_memory().await?))
    }

    /// Forget every entry for one object, across formats and versions.
    pub async fn remove(&self, path_id: &str) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/remove_path.sql"))
            .bind(path_id)
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    /// Drop entries not written within `age`.
    pub async fn prune_older_than(&self, age: Duration) -> Result<u64> {
        let age = i64::try_from(age.as_secs()).or_raise(|| ErrorKind::InvalidData("age"))?;
        let result = sqlx::query(include_str!("../queries/prune_before.sql"))
            .bind(now_unix().saturating_sub(age))
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/clear.sql"))
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[async_trait]
impl RowCache for SqliteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_entry.sql"))
            .bind(&key.path_id)
            .bind(&key.format)
            .bind(key.version.as_deref().unwrap_or_default())
            .fetch_optional(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheEntry::try_from).transpose()
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        let num_rows = entry
            .num_rows
            .map(i64::try_from)
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("num_rows"))?;
        let schema = entry
            .schema
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("schema"))?;
        let last_modified = entry
            .last_modified
            .map(|t| i64::try_from(t.unix_timestamp_nanos()))
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("last_modified"))?;
        sqlx::query(include_str!("../queries/upsert_entry.sql"))
            .bind(&key.path_id)
            .bind(&key.format)
            .bind(key.version.as_deref().unwrap_or_default())
            .bind(num_rows)
            .bind(schema)
            .bind(last_modified)
            .bind(now_unix())
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
