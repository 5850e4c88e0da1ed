//! Row count and schema cache for object scans.
//!
//! Counting rows or inferring columns of an object means reading all of it.
//! The cache remembers both per object so that a later scan of the same
//! object can skip that work. It is never the source of truth: entries are
//! keyed by the object's identity *and* version tag, and carry the
//! modification time seen when they were written, so overwritten objects stop
//! matching instead of serving stale counts.
//!
//! Two implementations are provided:
//! - [`MemoryCache`]: process-local, bounded by entry count and TTL.
//! - [`SqliteCache`]: persistent across runs (requires the `sqlite` feature).

#[cfg(feature = "sqlite")]
mod db;
pub mod error;
mod memory;
mod models;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use crate::db::Database;
pub use crate::memory::MemoryCache;
pub use crate::models::{CacheEntry, CacheKey, ColumnDef, Schema};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteCache;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared, process-wide cache service handed to every scan that uses it.
pub type CacheHandle = Arc<dyn RowCache>;

/// Contract between a scan and its row/schema cache.
#[async_trait]
pub trait RowCache: Send + Sync {
    /// Look up the entry for `key`.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Insert or update the entry for `key`.
    ///
    /// Updates merge: fields absent from `entry` keep their previous value,
    /// so a count-only scan never erases a schema learned earlier.
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()>;
}
