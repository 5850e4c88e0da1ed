//! In-memory object store for testing.

use crate::backend::{BoxSyncRead, paginate};
use crate::error::{ErrorKind, Result};
use crate::models::{ListPage, ObjectMeta, ReadHint};
use crate::path::{validate_key, validate_prefix};
use crate::ObjectStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

struct StoredBlob {
    modified: OffsetDateTime,
    version: u64,
    data: Arc<[u8]>,
}
impl StoredBlob {
    fn etag(&self) -> String {
        format!("v{}", self.version)
    }

    fn meta(&self, key: &str) -> ObjectMeta {
        ObjectMeta::new(key, self.data.len() as u64, Some(self.modified)).with_etag(self.etag())
    }
}

/// In-memory object store for testing.
///
/// Objects live in a [`BTreeMap`] behind a [`RwLock`], so listings come back
/// sorted without extra work and all trait methods operate on `&self`. Every
/// [`put`](Self::put) bumps the object's version tag, which makes cache
/// invalidation testable. Reads and listing calls are counted.
///
/// # Examples
///
/// ```
/// use strata_storage::backend::MemoryStore;
/// use strata_storage::ObjectStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::with_objects([("data/a.csv", "1\n2\n")]);
/// assert!(store.exists("data/a.csv").await?);
///
/// store.put("data/b.csv", "3\n").await;
/// assert_eq!(store.list("data/").await?.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    name: String,
    namespace: String,
    objects: RwLock<BTreeMap<String, StoredBlob>>,
    next_version: AtomicUsize,
    reads: AtomicUsize,
    listings: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            namespace: "memory".to_string(),
            objects: RwLock::new(BTreeMap::new()),
            next_version: AtomicUsize::new(1),
            reads: AtomicUsize::new(0),
            listings: AtomicUsize::new(0),
        }
    }

    /// Create a store pre-populated with objects.
    ///
    /// Panics if any key fails validation. If test setup is wrong, the test
    /// should not pass.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl AsRef<[u8]>)>) -> Self {
        let store = Self::new();
        let now = OffsetDateTime::now_utc();
        let mut map = BTreeMap::new();
        for (key, data) in objects {
            let key = key.into();
            let Ok(validated) = validate_key(&key) else {
                panic!("MemoryStore::with_objects: invalid key {key}");
            };
            let blob = StoredBlob {
                modified: now,
                version: store.bump_version(),
                data: Arc::from(data.as_ref()),
            };
            map.insert(validated, blob);
        }
        Self {
            objects: RwLock::new(map),
            ..store
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn bump_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) as u64
    }

    /// Insert or replace an object. Replacing assigns a new version tag and
    /// modification time.
    ///
    /// # Panics
    ///
    /// If the key fails validation.
    pub async fn put(&self, key: &str, data: impl AsRef<[u8]>) {
        let Ok(validated) = validate_key(key) else {
            panic!("MemoryStore::put: invalid key {key}");
        };
        let blob = StoredBlob {
            modified: OffsetDateTime::now_utc(),
            version: self.bump_version(),
            data: Arc::from(data.as_ref()),
        };
        self.objects.write().await.insert(validated, blob);
    }

    /// Remove an object, returning whether it existed.
    pub async fn remove(&self, key: &str) -> bool {
        match validate_key(key) {
            Ok(key) => self.objects.write().await.remove(&key).is_some(),
            Err(_) => false,
        }
    }

    /// Number of [`reader`](ObjectStore::reader) calls that opened an object.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of [`list_page`](ObjectStore::list_page) calls served.
    pub fn list_count(&self) -> usize {
        self.listings.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_page(&self, prefix: &str, continuation: Option<&str>, max_keys: usize) -> Result<ListPage> {
        let prefix = validate_prefix(prefix)?;
        self.listings.fetch_add(1, Ordering::Relaxed);
        let objects = self.objects.read().await;
        let matching = objects
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, blob)| blob.meta(key))
            .collect::<Vec<_>>();
        Ok(paginate(&matching, continuation, max_keys))
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta> {
        let key = validate_key(key)?;
        let objects = self.objects.read().await;
        match objects.get(&key) {
            Some(blob) => Ok(blob.meta(&key)),
            None => exn::bail!(ErrorKind::NotFound(key)),
        }
    }

    async fn reader(&self, key: &str, hint: ReadHint) -> Result<BoxSyncRead> {
        let key = validate_key(key)?;
        let data = match self.objects.read().await.get(&key) {
            Some(blob) if hint.version.as_deref().is_some_and(|v| v != blob.etag()) => {
                exn::bail!(ErrorKind::Modified(key))
            },
            Some(blob) => Arc::clone(&blob.data),
            None => exn::bail!(ErrorKind::NotFound(key)),
        };
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(Cursor::new(data)))
    }
}
