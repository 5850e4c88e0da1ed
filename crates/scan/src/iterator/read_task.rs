use crate::archive::{ArchiveOpener, ArchiveReaderCache};
use crate::error::{ErrorKind, Result};
use crate::iterator::{Hooks, ObjectIterator};
use crate::object::{ObjectInfo, ObjectInfoPtr};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_storage::{ObjectMeta, StoreHandle};
use tokio::sync::{Mutex, RwLock};

/// One unit of work assigned by a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTask {
    pub path: String,
    pub path_in_archive: Option<String>,
    /// Metadata the coordinator already has from its own listing.
    pub metadata: Option<ObjectMeta>,
}

impl ReadTask {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            path_in_archive: None,
            metadata: None,
        }
    }

    pub fn in_archive(mut self, path_in_archive: impl Into<String>) -> Self {
        self.path_in_archive = Some(path_in_archive.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ObjectMeta) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Hands out read tasks in batches. An empty batch means there is no more
/// work.
#[async_trait]
pub trait ReadTaskSource: Send + Sync {
    async fn next_tasks(&self) -> Result<Vec<ReadTask>>;
}

/// Objects assigned by a coordinator through a [`ReadTaskSource`].
///
/// Callers claim buffer slots with an atomic index. Only a caller that finds
/// the buffer used up asks the source for more, and only one does at a time.
pub struct ReadTaskIterator {
    source: Arc<dyn ReadTaskSource>,
    store: StoreHandle,
    opener: Option<Arc<dyn ArchiveOpener>>,
    readers: ArchiveReaderCache,
    hooks: Hooks,
    tasks: RwLock<Vec<ReadTask>>,
    index: AtomicUsize,
    received: AtomicUsize,
    /// Held while fetching a batch; `true` once the source is drained.
    exhausted: Mutex<bool>,
}

impl ReadTaskIterator {
    pub fn new(
        source: Arc<dyn ReadTaskSource>,
        store: StoreHandle,
        opener: Option<Arc<dyn ArchiveOpener>>,
        hooks: Hooks,
    ) -> Self {
        Self {
            source,
            store,
            opener,
            readers: ArchiveReaderCache::default(),
            hooks,
            tasks: RwLock::new(Vec::new()),
            index: AtomicUsize::new(0),
            received: AtomicUsize::new(0),
            exhausted: Mutex::new(false),
        }
    }

    /// Claim the next task. An index is only taken once the buffer holds a
    /// task for it, so a failed refill does not lose a slot.
    async fn claim(&self) -> Result<Option<ReadTask>> {
        loop {
            {
                let tasks = self.tasks.read().await;
                let index = self.index.load(Ordering::SeqCst);
                if let Some(task) = tasks.get(index) {
                    if self.index.compare_exchange(index, index + 1, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                        return Ok(Some(task.clone()));
                    }
                    continue;
                }
            }
            let mut exhausted = self.exhausted.lock().await;
            if self.tasks.read().await.len() > self.index.load(Ordering::SeqCst) {
                // Another caller refilled while we waited for the lock.
                continue;
            }
            if *exhausted {
                return Ok(None);
            }
            let batch = self.source.next_tasks().await.or_raise(|| ErrorKind::ReadTask)?;
            if batch.is_empty() {
                tracing::debug!(tasks = self.received.load(Ordering::Relaxed), "read task source drained");
                *exhausted = true;
                return Ok(None);
            }
            tracing::debug!(tasks = batch.len(), "received read tasks");
            self.received.fetch_add(batch.len(), Ordering::Relaxed);
            self.tasks.write().await.extend(batch);
        }
    }

    async fn resolve(&self, task: ReadTask) -> Result<ObjectInfo> {
        let object = ObjectInfo::stored(task.path.clone(), task.metadata);
        let Some(inner) = task.path_in_archive else {
            return Ok(object);
        };
        let opener = self
            .opener
            .as_ref()
            .ok_or_raise(|| ErrorKind::Configuration(format!("read task for {} needs an archive opener", task.path)))?;
        let archive = Arc::new(object);
        let reader = self.readers.get_or_open(&archive, &self.store, opener).await?;
        let info = reader
            .file_info(&inner)
            .ok_or_raise(|| ErrorKind::PathNotInArchive(task.path.clone(), inner.clone()))?;
        Ok(ObjectInfo::in_archive(archive, inner, reader, info))
    }
}

#[async_trait]
impl ObjectIterator for ReadTaskIterator {
    async fn next(&self, processor: usize) -> Result<Option<ObjectInfoPtr>> {
        loop {
            let Some(task) = self.claim().await? else {
                return Ok(None);
            };
            tracing::trace!(path = %task.path, processor, "claimed read task");
            let object = self.resolve(task).await?;
            if !self.hooks.accepts(&object) {
                continue;
            }
            return Ok(Some(self.hooks.hand_out(Arc::new(object))));
        }
    }

    fn estimated_keys_count(&self) -> usize {
        self.received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use strata_storage::backend::MemoryStore;

    /// Fails its first call, then hands out one batch.
    #[derive(Default)]
    struct FlakySource {
        failed: AtomicBool,
        served: AtomicBool,
    }

    #[async_trait]
    impl ReadTaskSource for FlakySource {
        async fn next_tasks(&self) -> Result<Vec<ReadTask>> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                exn::bail!(ErrorKind::Configuration("coordinator unavailable".to_string()));
            }
            if self.served.swap(true, Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            Ok(vec![ReadTask::new("a.csv"), ReadTask::new("b.csv")])
        }
    }

    #[tokio::test]
    async fn test_failed_refill_keeps_position() {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let iterator = ReadTaskIterator::new(Arc::new(FlakySource::default()), store, None, Hooks::default());
        let err = iterator.next(0).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::ReadTask));
        let mut paths = Vec::new();
        while let Some(object) = iterator.next(0).await.unwrap() {
            paths.push(object.path().into_owned());
        }
        assert_eq!(paths, ["a.csv", "b.csv"]);
    }
}
