use crate::error::{ErrorKind, Result};
use crate::iterator::{Hooks, ObjectIterator};
use crate::object::{ObjectInfo, ObjectInfoPtr};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_config::ScanSettings;
use strata_storage::StoreHandle;

/// Explicit list of keys, handed out in the order given.
///
/// A shared atomic cursor is the only synchronization: each call claims the
/// next index. Existence is checked when a key is claimed, not up front, so
/// a long key list costs nothing until it is read.
pub struct KeysIterator {
    store: StoreHandle,
    keys: Vec<String>,
    cursor: AtomicUsize,
    ignore_non_existent_files: bool,
    skip_object_metadata: bool,
    hooks: Hooks,
}

impl KeysIterator {
    pub fn new(store: StoreHandle, keys: &[String], settings: &ScanSettings, hooks: Hooks) -> Self {
        Self {
            store,
            keys: keys.iter().map(|key| key.trim_start_matches('/').to_string()).collect(),
            cursor: AtomicUsize::new(0),
            ignore_non_existent_files: settings.ignore_non_existent_files,
            skip_object_metadata: settings.skip_object_metadata,
            hooks,
        }
    }

    async fn resolve(&self, key: &str) -> Result<Option<ObjectInfo>> {
        if self.skip_object_metadata {
            return Ok(Some(ObjectInfo::stored(key, None)));
        }
        match self.store.head(key).await {
            Ok(meta) => Ok(Some(ObjectInfo::from_meta(meta))),
            Err(err) if err.is_not_found() && self.ignore_non_existent_files => {
                tracing::warn!(key, "object does not exist; skipping");
                Ok(None)
            },
            Err(err) if err.is_not_found() => Err(err.raise(ErrorKind::ObjectNotFound(key.to_string()))),
            Err(err) => Err(err.raise(ErrorKind::Open(key.to_string()))),
        }
    }
}

#[async_trait]
impl ObjectIterator for KeysIterator {
    async fn next(&self, processor: usize) -> Result<Option<ObjectInfoPtr>> {
        loop {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed);
            let Some(key) = self.keys.get(index) else {
                return Ok(None);
            };
            let Some(object) = self.resolve(key).await? else {
                continue;
            };
            if !self.hooks.accepts(&object) {
                tracing::trace!(key, processor, "object filtered out");
                continue;
            }
            return Ok(Some(self.hooks.hand_out(Arc::new(object))));
        }
    }

    fn estimated_keys_count(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::VirtualColumns;
    use rstest::rstest;
    use strata_storage::backend::MemoryStore;

    fn iterator(keys: &[&str], settings: ScanSettings) -> KeysIterator {
        let store = Arc::new(MemoryStore::with_objects([("a.csv", "1\n"), ("b.csv", "2\n"), ("c.csv", "")]));
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        KeysIterator::new(store, &keys, &settings, Hooks::default())
    }

    async fn drain(iterator: &KeysIterator) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        while let Some(object) = iterator.next(0).await? {
            paths.push(object.path().into_owned());
        }
        Ok(paths)
    }

    #[tokio::test]
    async fn test_preserves_input_order() {
        let iterator = iterator(&["c.csv", "/a.csv", "b.csv"], ScanSettings::default());
        assert_eq!(iterator.estimated_keys_count(), 3);
        assert_eq!(drain(&iterator).await.unwrap(), ["c.csv", "a.csv", "b.csv"]);
        assert!(iterator.next(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metadata_is_fetched() {
        let iterator = iterator(&["a.csv"], ScanSettings::default());
        let object = iterator.next(0).await.unwrap().unwrap();
        assert_eq!(object.size(), Some(2));
        assert!(object.etag().is_some());
    }

    #[rstest]
    #[case(true, Ok(vec!["a.csv", "b.csv"]))]
    #[case(false, Err(()))]
    #[tokio::test]
    async fn test_missing_key(#[case] ignore: bool, #[case] expected: std::result::Result<Vec<&str>, ()>) {
        let settings = ScanSettings {
            ignore_non_existent_files: ignore,
            ..ScanSettings::default()
        };
        let iterator = iterator(&["a.csv", "gone.csv", "b.csv"], settings);
        match (drain(&iterator).await, expected) {
            (Ok(paths), Ok(expected)) => assert_eq!(paths, expected),
            (Err(err), Err(())) => assert!(err.is_not_found()),
            (actual, expected) => panic!("expected {expected:?}, got {:?}", actual.map_err(|e| e.to_string())),
        }
    }

    #[tokio::test]
    async fn test_skip_object_metadata_defers_existence() {
        let settings = ScanSettings {
            skip_object_metadata: true,
            ..ScanSettings::default()
        };
        let iterator = iterator(&["gone.csv"], settings);
        let object = iterator.next(0).await.unwrap().unwrap();
        assert_eq!(object.path(), "gone.csv");
        assert_eq!(object.size(), None);
    }

    #[tokio::test]
    async fn test_predicate_filters() {
        let store = Arc::new(MemoryStore::with_objects([("a.csv", "1"), ("b.csv", "22")]));
        let keys = vec!["a.csv".to_string(), "b.csv".to_string()];
        let hooks = Hooks::default().with_predicate(Arc::new(|columns: &VirtualColumns| columns.size == Some(2)));
        let iterator = KeysIterator::new(store, &keys, &ScanSettings::default(), hooks);
        assert_eq!(drain(&iterator).await.unwrap(), ["b.csv"]);
    }
}
