//! Process-local cache.

use crate::error::Result;
use crate::{CacheEntry, CacheKey, RowCache};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct Slot {
    entry: CacheEntry,
    written: Instant,
}

/// In-memory [`RowCache`] bounded by entry count and (optionally) age.
///
/// When full, the least recently used entry is evicted. Expired entries are
/// invisible to [`get`](RowCache::get) and dropped when next touched.
pub struct MemoryCache {
    slots: Mutex<LruCache<CacheKey, Slot>>,
    ttl: Option<Duration>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        self.ttl.is_some_and(|ttl| now.duration_since(slot.written) >= ttl)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl RowCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let expired = match slots.get(key) {
            Some(slot) if !self.is_expired(slot, now) => return Ok(Some(slot.entry.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            slots.pop(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let entry = match slots.pop(key) {
            Some(previous) if !self.is_expired(&previous, now) => previous.entry.merge(entry),
            _ => entry,
        };
        if let Some((evicted, _)) = slots.push(key.clone(), Slot { entry, written: now }) {
            tracing::trace!(key = %evicted, "evicting cache entry");
        }
        Ok(())
    }
}
