use crate::archive::{ArchiveFileInfo, ArchiveHandle, ArchiveOpener, open_archive};
use crate::error::Result;
use crate::iterator::{Hooks, InnerPath, IteratorHandle, ObjectIterator};
use crate::object::{ObjectInfo, ObjectInfoPtr};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use strata_storage::StoreHandle;
use tokio::sync::Mutex;

#[derive(Default)]
struct ArchiveState {
    current: Option<(ObjectInfoPtr, ArchiveHandle)>,
    entries: VecDeque<(String, ArchiveFileInfo)>,
}

/// Files inside the archives produced by an inner iterator.
///
/// Archives are consumed one at a time: all selected files of the current
/// archive are handed out before the next archive is pulled and opened. Only
/// the current archive is kept open here; handed-out files keep their own
/// archive alive until they are read.
pub struct ArchiveIterator {
    inner: IteratorHandle,
    store: StoreHandle,
    opener: Arc<dyn ArchiveOpener>,
    path: InnerPath,
    hooks: Hooks,
    state: Mutex<ArchiveState>,
}

impl ArchiveIterator {
    pub fn new(
        inner: IteratorHandle,
        store: StoreHandle,
        opener: Arc<dyn ArchiveOpener>,
        path: InnerPath,
        hooks: Hooks,
    ) -> Self {
        Self {
            inner,
            store,
            opener,
            path,
            hooks,
            state: Mutex::new(ArchiveState::default()),
        }
    }

    fn select(&self, archive: &ObjectInfo, reader: &ArchiveHandle) -> Vec<(String, ArchiveFileInfo)> {
        match &self.path {
            InnerPath::Fixed(path) => match reader.file_info(path) {
                Some(info) => vec![(path.clone(), info)],
                None => {
                    tracing::debug!(archive = %archive.path(), path, "archive does not contain file; skipping");
                    Vec::new()
                },
            },
            InnerPath::Glob(matcher) => reader.files(&|name| matcher.is_match(name)),
        }
    }
}

#[async_trait]
impl ObjectIterator for ArchiveIterator {
    async fn next(&self, processor: usize) -> Result<Option<ObjectInfoPtr>> {
        let mut guard = self.state.lock().await;
        let ArchiveState { current, entries } = &mut *guard;
        loop {
            if let Some((archive, reader)) = current.as_ref()
                && let Some((path, info)) = entries.pop_front()
            {
                let object = ObjectInfo::in_archive(Arc::clone(archive), path, Arc::clone(reader), info);
                if !self.hooks.accepts(&object) {
                    continue;
                }
                return Ok(Some(self.hooks.hand_out(Arc::new(object))));
            }
            *current = None;
            let Some(archive) = self.inner.next(processor).await? else {
                return Ok(None);
            };
            tracing::debug!(archive = %archive.path(), "opening archive");
            let reader = open_archive(&self.store, &self.opener, &archive).await?;
            *entries = self.select(&archive, &reader).into();
            tracing::debug!(archive = %archive.path(), files = entries.len(), "reading archive");
            *current = Some((archive, reader));
        }
    }

    fn estimated_keys_count(&self) -> usize {
        self.inner.estimated_keys_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveReader, BoxSyncRead};
    use crate::iterator::KeysIterator;
    use std::io::Cursor;
    use std::sync::Weak;
    use strata_config::ScanSettings;
    use strata_storage::backend::MemoryStore;

    struct OneFile;

    impl ArchiveReader for OneFile {
        fn file_info(&self, path: &str) -> Option<ArchiveFileInfo> {
            (path == "data.csv").then_some(ArchiveFileInfo {
                size: 1,
                modified: None,
            })
        }

        fn files(&self, filter: &dyn Fn(&str) -> bool) -> Vec<(String, ArchiveFileInfo)> {
            let info = self.file_info("data.csv").filter(|_| filter("data.csv"));
            info.map(|info| ("data.csv".to_string(), info)).into_iter().collect()
        }

        fn read_file(&self, _path: &str) -> Result<BoxSyncRead> {
            Ok(Box::new(Cursor::new(b"1".to_vec())))
        }
    }

    /// Remembers every reader it opened without keeping it alive.
    #[derive(Default)]
    struct TrackingOpener {
        opened: std::sync::Mutex<Vec<Weak<OneFile>>>,
    }

    impl ArchiveOpener for TrackingOpener {
        fn open(&self, _archive: &ObjectInfo, _stream: BoxSyncRead) -> Result<ArchiveHandle> {
            let reader = Arc::new(OneFile);
            self.opened.lock().unwrap().push(Arc::downgrade(&reader));
            Ok(reader)
        }
    }

    #[tokio::test]
    async fn test_previous_archive_is_released() {
        let store: StoreHandle = Arc::new(MemoryStore::with_objects([("a.tar", "a"), ("b.tar", "b")]));
        let keys = ["a.tar".to_string(), "b.tar".to_string()];
        let inner = KeysIterator::new(Arc::clone(&store), &keys, &ScanSettings::default(), Hooks::default());
        let tracking = Arc::new(TrackingOpener::default());
        let opener: Arc<dyn ArchiveOpener> = tracking.clone();
        let path = InnerPath::Fixed("data.csv".to_string());
        let iterator = ArchiveIterator::new(Arc::new(inner), store, opener, path, Hooks::default());

        let first = iterator.next(0).await.unwrap().unwrap();
        assert_eq!(first.path_to_archive().as_deref(), Some("a.tar"));
        drop(first);
        let second = iterator.next(0).await.unwrap().unwrap();
        assert_eq!(second.path_to_archive().as_deref(), Some("b.tar"));

        let opened = tracking.opened.lock().unwrap();
        assert_eq!(opened.len(), 2);
        assert!(opened[0].upgrade().is_none());
        assert!(opened[1].upgrade().is_some());
    }
}
