//! What a scan reads: objects in a store and files inside archives.

use crate::archive::{ArchiveFileInfo, ArchiveHandle};
use std::borrow::Cow;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, Mutex, PoisonError};
use strata_storage::{ObjectMeta, ObjectStore, ReadHint};
use time::OffsetDateTime;

/// Objects are immutable once enumerated and shared between the iterator,
/// the reader that opens them, and every batch produced from them.
pub type ObjectInfoPtr = Arc<ObjectInfo>;

/// A plain object in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    /// `None` when metadata probing was skipped; size and version are then
    /// unknown until the object is opened.
    pub metadata: Option<ObjectMeta>,
}

/// A file inside an archive object.
#[derive(Clone)]
pub struct ArchiveMember {
    pub archive: ObjectInfoPtr,
    pub path_in_archive: String,
    pub reader: ArchiveHandle,
    pub info: ArchiveFileInfo,
}
impl Debug for ArchiveMember {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ArchiveMember")
            .field("archive", &self.archive)
            .field("path_in_archive", &self.path_in_archive)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// One scannable unit.
#[derive(Debug, Clone)]
pub enum ObjectInfo {
    Stored(StoredObject),
    InArchive(ArchiveMember),
}

impl ObjectInfo {
    pub fn stored(key: impl Into<String>, metadata: Option<ObjectMeta>) -> Self {
        Self::Stored(StoredObject {
            key: key.into(),
            metadata,
        })
    }

    pub fn from_meta(meta: ObjectMeta) -> Self {
        Self::stored(meta.key.clone(), Some(meta))
    }

    pub fn in_archive(
        archive: ObjectInfoPtr,
        path_in_archive: impl Into<String>,
        reader: ArchiveHandle,
        info: ArchiveFileInfo,
    ) -> Self {
        Self::InArchive(ArchiveMember {
            archive,
            path_in_archive: path_in_archive.into(),
            reader,
            info,
        })
    }

    /// Full path of the object. Files in archives are addressed as
    /// `archive_path::inner_path`.
    pub fn path(&self) -> Cow<'_, str> {
        match self {
            Self::Stored(object) => Cow::Borrowed(&object.key),
            Self::InArchive(member) => Cow::Owned(format!("{}::{}", member.archive.path(), member.path_in_archive)),
        }
    }

    /// Last path segment of a stored object, or the path inside the archive.
    pub fn file_name(&self) -> &str {
        match self {
            Self::Stored(object) => object.key.rsplit('/').next().unwrap_or(&object.key),
            Self::InArchive(member) => &member.path_in_archive,
        }
    }

    /// Size in bytes (uncompressed size for archive members).
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Stored(object) => object.metadata.as_ref().map(|meta| meta.size),
            Self::InArchive(member) => Some(member.info.size),
        }
    }

    pub fn modified(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Stored(object) => object.metadata.as_ref().and_then(|meta| meta.modified),
            Self::InArchive(member) => member.info.modified.or_else(|| member.archive.modified()),
        }
    }

    /// Version tag. Archive members carry the version of their archive.
    pub fn etag(&self) -> Option<&str> {
        match self {
            Self::Stored(object) => object.metadata.as_ref().and_then(|meta| meta.etag.as_deref()),
            Self::InArchive(member) => member.archive.etag(),
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Self::InArchive(_))
    }

    pub fn path_to_archive(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Stored(_) => None,
            Self::InArchive(member) => Some(member.archive.path()),
        }
    }

    /// What is known up front about a stored object, handed to the store
    /// when opening it.
    pub fn read_hint(&self) -> ReadHint {
        match self {
            Self::Stored(StoredObject {
                metadata: Some(meta), ..
            }) => ReadHint::from(meta),
            Self::Stored(_) => ReadHint::default(),
            Self::InArchive(member) => member.archive.read_hint(),
        }
    }

    /// Stable identity of the object across scans, used as cache key and in
    /// logs.
    ///
    /// Two stores serving the same namespace from different endpoints are
    /// told apart only when `include_connection_info` is set.
    pub fn unique_identifier(&self, store: &dyn ObjectStore, include_connection_info: bool) -> String {
        let path = self.path();
        let path = path.strip_prefix('/').unwrap_or(&path);
        let namespace = store.namespace().trim_matches('/');
        if include_connection_info {
            format!("{}/{namespace}/{path}", store.connection_info())
        } else {
            format!("{namespace}/{path}")
        }
    }
}

/// Progress notification sent when an object is handed to a reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileProgress {
    pub read_bytes: u64,
    pub total_bytes_to_read: u64,
}

pub type ProgressCallback = Arc<dyn Fn(FileProgress) + Send + Sync>;

/// Collector of every object an iterator has handed out, in hand-out order.
///
/// Cheap to clone; all clones share one list.
#[derive(Debug, Clone, Default)]
pub struct ReadKeys(Arc<Mutex<Vec<ObjectInfoPtr>>>);
impl ReadKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, object: ObjectInfoPtr) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(object);
    }

    pub fn snapshot(&self) -> Vec<ObjectInfoPtr> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveReader;
    use rstest::rstest;
    use strata_storage::backend::{BoxSyncRead, MemoryStore};

    struct EmptyArchive;
    impl ArchiveReader for EmptyArchive {
        fn file_info(&self, _path: &str) -> Option<ArchiveFileInfo> {
            None
        }

        fn files(&self, _filter: &dyn Fn(&str) -> bool) -> Vec<(String, ArchiveFileInfo)> {
            Vec::new()
        }

        fn read_file(&self, path: &str) -> crate::error::Result<BoxSyncRead> {
            exn::bail!(crate::error::ErrorKind::PathNotInArchive("empty".into(), path.into()))
        }
    }

    fn member(archive_key: &str, inner: &str) -> ObjectInfo {
        let meta = ObjectMeta::new(archive_key, 100, None).with_etag("v7");
        let archive = Arc::new(ObjectInfo::from_meta(meta));
        let info = ArchiveFileInfo { size: 12, modified: None };
        ObjectInfo::in_archive(archive, inner, Arc::new(EmptyArchive), info)
    }

    #[rstest]
    #[case("data/a.csv", "a.csv")]
    #[case("a.csv", "a.csv")]
    fn test_file_name(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(ObjectInfo::stored(key, None).file_name(), expected);
    }

    #[test]
    fn test_archive_member_accessors() {
        let object = member("logs/2024.tar", "jan/day1.csv");
        assert!(object.is_archive());
        assert_eq!(object.path(), "logs/2024.tar::jan/day1.csv");
        assert_eq!(object.file_name(), "jan/day1.csv");
        assert_eq!(object.size(), Some(12));
        assert_eq!(object.etag(), Some("v7"));
        assert_eq!(object.path_to_archive().as_deref(), Some("logs/2024.tar"));
    }

    #[test]
    fn test_stored_without_metadata() {
        let object = ObjectInfo::stored("a.csv", None);
        assert!(!object.is_archive());
        assert_eq!(object.size(), None);
        assert_eq!(object.read_hint(), ReadHint::default());
        assert!(object.path_to_archive().is_none());
    }

    #[rstest]
    #[case(true, "memory/bucket/data/a.csv")]
    #[case(false, "bucket/data/a.csv")]
    fn test_unique_identifier(#[case] include_connection_info: bool, #[case] expected: &str) {
        let store = MemoryStore::new().with_namespace("bucket");
        let object = ObjectInfo::stored("/data/a.csv", None);
        assert_eq!(object.unique_identifier(&store, include_connection_info), expected);
    }

    #[test]
    fn test_archive_members_never_collide() {
        let store = MemoryStore::new().with_namespace("bucket");
        let first = member("a.tar", "x.csv").unique_identifier(&store, false);
        let second = member("a.tar", "y.csv").unique_identifier(&store, false);
        assert_eq!(first, "bucket/a.tar::x.csv");
        assert_ne!(first, second);
    }

    #[test]
    fn test_read_keys_shared_between_clones() {
        let keys = ReadKeys::new();
        let clone = keys.clone();
        clone.push(Arc::new(ObjectInfo::stored("a.csv", None)));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.snapshot()[0].path(), "a.csv");
    }
}
