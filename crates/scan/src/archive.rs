//! Reading files out of archive objects.
//!
//! Decoding archive formats is not this crate's business: an
//! [`ArchiveOpener`] turns an archive's byte stream into an
//! [`ArchiveReader`], which the scan only asks for a file index and for
//! individual files. A tar implementation ships behind the `tar` feature.

#[cfg(feature = "tar")]
mod tarball;

#[cfg(feature = "tar")]
pub use self::tarball::TarOpener;
use crate::error::{ErrorKind, Result};
use crate::object::{ObjectInfo, ObjectInfoPtr};
use exn::ResultExt;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
pub use strata_storage::backend::BoxSyncRead;
use strata_storage::StoreHandle;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// Per-file metadata from an archive's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveFileInfo {
    /// Uncompressed size in bytes
    pub size: u64,
    pub modified: Option<OffsetDateTime>,
}

/// An opened archive.
///
/// Methods are blocking; callers run them on the blocking pool when they may
/// touch I/O.
pub trait ArchiveReader: Send + Sync {
    fn file_info(&self, path: &str) -> Option<ArchiveFileInfo>;

    fn file_exists(&self, path: &str) -> bool {
        self.file_info(path).is_some()
    }

    /// Every file whose path passes `filter`, in archive order.
    fn files(&self, filter: &dyn Fn(&str) -> bool) -> Vec<(String, ArchiveFileInfo)>;

    fn read_file(&self, path: &str) -> Result<BoxSyncRead>;
}

pub type ArchiveHandle = Arc<dyn ArchiveReader>;

/// Factory for [`ArchiveReader`]s. `open` is called on the blocking pool.
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, archive: &ObjectInfo, stream: BoxSyncRead) -> Result<ArchiveHandle>;
}

/// Archives a read-task scan keeps open at once.
const DEFAULT_OPEN_ARCHIVES: usize = 4;

pub(crate) async fn open_archive(
    store: &StoreHandle,
    opener: &Arc<dyn ArchiveOpener>,
    archive: &ObjectInfoPtr,
) -> Result<ArchiveHandle> {
    let key = archive.path().into_owned();
    let stream = store.reader(&key, archive.read_hint()).await.or_raise(|| ErrorKind::Archive(key.clone()))?;
    let opener = Arc::clone(opener);
    let object = Arc::clone(archive);
    tokio::task::spawn_blocking(move || opener.open(&object, stream))
        .await
        .or_raise(|| ErrorKind::Background)?
        .or_raise(|| ErrorKind::Archive(key))
}

/// Recently opened archives by archive path, so consecutive files of one
/// archive do not reopen it. Bounded: an opened archive may hold all of its
/// files in memory.
pub(crate) struct ArchiveReaderCache {
    readers: Mutex<LruCache<String, ArchiveHandle>>,
}

impl ArchiveReaderCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            readers: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The lock is held while opening: concurrent callers asking for the same
    /// archive wait for the first open instead of repeating it.
    pub(crate) async fn get_or_open(
        &self,
        archive: &ObjectInfoPtr,
        store: &StoreHandle,
        opener: &Arc<dyn ArchiveOpener>,
    ) -> Result<ArchiveHandle> {
        let key = archive.path().into_owned();
        let mut readers = self.readers.lock().await;
        if let Some(reader) = readers.get(&key) {
            return Ok(Arc::clone(reader));
        }
        tracing::debug!(archive = %key, "opening archive");
        let reader = open_archive(store, opener, archive).await?;
        if let Some((evicted, _)) = readers.push(key, Arc::clone(&reader)) {
            tracing::trace!(archive = %evicted, "releasing archive");
        }
        Ok(reader)
    }
}

impl Default for ArchiveReaderCache {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_ARCHIVES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_storage::backend::MemoryStore;

    /// Treats every archive as holding a single file `inner` with the
    /// archive's bytes as contents.
    #[derive(Default)]
    struct SingleFileOpener {
        opens: AtomicUsize,
    }

    struct SingleFile(Vec<u8>);

    impl ArchiveReader for SingleFile {
        fn file_info(&self, path: &str) -> Option<ArchiveFileInfo> {
            (path == "inner").then_some(ArchiveFileInfo {
                size: self.0.len() as u64,
                modified: None,
            })
        }

        fn files(&self, filter: &dyn Fn(&str) -> bool) -> Vec<(String, ArchiveFileInfo)> {
            let info = self.file_info("inner").filter(|_| filter("inner"));
            info.map(|info| ("inner".to_string(), info)).into_iter().collect()
        }

        fn read_file(&self, _path: &str) -> Result<BoxSyncRead> {
            Ok(Box::new(Cursor::new(self.0.clone())))
        }
    }

    impl ArchiveOpener for SingleFileOpener {
        fn open(&self, _archive: &ObjectInfo, mut stream: BoxSyncRead) -> Result<ArchiveHandle> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let mut data = Vec::new();
            stream.read_to_end(&mut data).or_raise(|| ErrorKind::Archive("test".into()))?;
            Ok(Arc::new(SingleFile(data)))
        }
    }

    #[tokio::test]
    async fn test_cache_opens_once() {
        let store: StoreHandle = Arc::new(MemoryStore::with_objects([("a.zip", "hello")]));
        let counting = Arc::new(SingleFileOpener::default());
        let opener: Arc<dyn ArchiveOpener> = counting.clone();
        let cache = ArchiveReaderCache::default();
        let archive = Arc::new(ObjectInfo::stored("a.zip", None));
        for _ in 0..3 {
            let reader = cache.get_or_open(&archive, &store, &opener).await.unwrap();
            assert!(reader.file_exists("inner"));
            assert!(!reader.file_exists("other"));
        }
        assert_eq!(counting.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let store: StoreHandle = Arc::new(MemoryStore::with_objects([("a.zip", "a"), ("b.zip", "b")]));
        let counting = Arc::new(SingleFileOpener::default());
        let opener: Arc<dyn ArchiveOpener> = counting.clone();
        let cache = ArchiveReaderCache::new(1);
        let a = Arc::new(ObjectInfo::stored("a.zip", None));
        let b = Arc::new(ObjectInfo::stored("b.zip", None));
        let first = Arc::downgrade(&cache.get_or_open(&a, &store, &opener).await.unwrap());
        cache.get_or_open(&b, &store, &opener).await.unwrap();
        assert!(first.upgrade().is_none());
        cache.get_or_open(&a, &store, &opener).await.unwrap();
        assert_eq!(counting.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_archive_is_archive_error() {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let opener: Arc<dyn ArchiveOpener> = Arc::new(SingleFileOpener::default());
        let archive = Arc::new(ObjectInfo::stored("missing.zip", None));
        let err = ArchiveReaderCache::default().get_or_open(&archive, &store, &opener).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Archive(path) if path == "missing.zip"));
    }
}
