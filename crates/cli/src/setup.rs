//! Turn loaded settings into the collaborators a scan needs.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use strata_cache::{CacheHandle, MemoryCache, SqliteCache};
use strata_config::{CacheKind, CacheSettings, StoreSettings};
use strata_storage::StoreHandle;
use strata_storage::backend::{LocalStore, S3Store};

pub fn build_store(settings: &StoreSettings) -> Result<StoreHandle> {
    match settings {
        StoreSettings::Local { root } => {
            let display = root.display().to_string();
            // The local backend only accepts absolute roots.
            let root = std::fs::canonicalize(root).or_raise(|| ErrorKind::Store(display.clone()))?;
            let store = LocalStore::new("local", &root).or_raise(|| ErrorKind::Store(display))?;
            tracing::debug!(root = %root.display(), "using local store");
            Ok(Arc::new(store))
        },
        StoreSettings::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            key_id,
            key_secret,
        } => {
            let store = S3Store::new("s3", bucket, prefix.clone(), region, endpoint.clone(), key_id, key_secret)
                .or_raise(|| ErrorKind::Store(format!("s3://{bucket}")))?;
            tracing::debug!(bucket = %bucket, region = %region, "using S3 store");
            Ok(Arc::new(store))
        },
    }
}

pub async fn build_cache(settings: &CacheSettings) -> Result<Option<CacheHandle>> {
    match settings.kind {
        CacheKind::None => Ok(None),
        CacheKind::Memory => {
            let cache = MemoryCache::new(settings.max_entries).with_ttl(settings.ttl());
            Ok(Some(Arc::new(cache)))
        },
        CacheKind::Sqlite => {
            let path = settings
                .path
                .as_deref()
                .ok_or_raise(|| ErrorKind::Cache("cache.path is not set".to_string()))?;
            let display = path.display().to_string();
            let cache = SqliteCache::open(path).await.or_raise(|| ErrorKind::Cache(display.clone()))?;
            if let Some(ttl) = settings.ttl() {
                let pruned = cache.prune_older_than(ttl).await.or_raise(|| ErrorKind::Cache(display))?;
                tracing::debug!(pruned, "pruned expired cache entries");
            }
            Ok(Some(Arc::new(cache)))
        },
    }
}
