//! Local filesystem object store.
//!
//! Treats a directory as a bucket: every regular file below the root is an
//! object whose key is its `/`-separated relative path. Listing walks the
//! directory tree asynchronously via `tokio::fs`, once per listing: later
//! pages are cut from the sorted snapshot taken for the first one.

use crate::backend::{BoxSyncRead, ObjectMetaStream, paginate};
use crate::error::{ErrorKind, Result};
use crate::models::{ListPage, ObjectMeta, ReadHint};
use crate::path::{validate_key, validate_prefix};
use crate::ObjectStore;
use async_stream::stream;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::TryStreamExt;
use lru::LruCache;
use std::fs::Metadata;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use time::OffsetDateTime;
use tokio::fs::{self, DirEntry};
use tokio::sync::Mutex;

/// Listings that may be resumed with a continuation at the same time.
const OPEN_LISTINGS: usize = 8;

type Listing = Arc<[ObjectMeta]>;

enum WalkEntry {
    File(ObjectMeta),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem object store.
///
/// # Examples
///
/// ```no_run
/// use strata_storage::backend::LocalStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalStore::new("local", "/srv/datasets")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalStore {
    name: String,
    /// Root directory acting as the namespace
    root: PathBuf,
    namespace: String,
    /// Sorted walk results by prefix, dropped once the last page is served
    listings: Arc<Mutex<LruCache<String, Listing>>>,
}
impl LocalStore {
    /// Create a new local filesystem store.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let display = root.to_string_lossy().into_owned();
        if !root.is_absolute() || !root.is_dir() {
            exn::bail!(ErrorKind::InvalidKey(display));
        }
        Ok(Self {
            name: name.into(),
            namespace: display.trim_end_matches('/').to_string(),
            root,
            listings: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(OPEN_LISTINGS).unwrap_or(NonZeroUsize::MIN),
            ))),
        })
    }

    fn absolute_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_key(key)?))
    }

    /// Convert an absolute path back to an object key.
    fn relative_key(&self, absolute: &Path) -> Result<String> {
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{}` is not within root `{}`", absolute.display(), self.namespace))
        })?;
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()
            .ok_or_raise(|| ErrorKind::InvalidKey(relative.to_string_lossy().into_owned()))?;
        validate_key(&segments.join("/"))
    }

    fn meta(key: String, metadata: &Metadata) -> ObjectMeta {
        let modified = metadata.modified().ok();
        let meta = ObjectMeta::new(key, metadata.len(), modified.map(OffsetDateTime::from));
        match Self::etag(metadata) {
            Some(etag) => meta.with_etag(etag),
            None => meta,
        }
    }

    /// Version tag built from modification time and size.
    fn etag(metadata: &Metadata) -> Option<String> {
        let modified = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
        Some(format!("{:x}-{:x}", modified.as_nanos(), metadata.len()))
    }

    fn map_io_error(e: std::io::Error, key: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(key.to_string()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn process_entry(&self, entry: DirEntry, prefix: &str) -> Result<WalkEntry> {
        let path = entry.path();
        let map_err = |e: std::io::Error| Self::map_io_error(e, &path.to_string_lossy());
        let file_type = entry.file_type().await.map_err(map_err)?;
        let metadata = if file_type.is_symlink() {
            // Links to files are objects. Dangling links and links to
            // directories are skipped, so the walk cannot cycle.
            match fs::metadata(&path).await {
                Ok(target) if target.is_file() => target,
                Ok(_) => return Ok(WalkEntry::Skip),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WalkEntry::Skip),
                Err(e) => exn::bail!(map_err(e)),
            }
        } else {
            entry.metadata().await.map_err(map_err)?
        };
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if !metadata.is_file() {
            return Ok(WalkEntry::Skip);
        }
        let key = self.relative_key(&path)?;
        if !key.starts_with(prefix) {
            return Ok(WalkEntry::Skip);
        }
        Ok(WalkEntry::File(Self::meta(key, &metadata)))
    }

    /// Walk every file below the directory part of `prefix`, unordered.
    fn walk<'a>(&'a self, prefix: &'a str) -> ObjectMetaStream<'a> {
        // "data/2024/part-" can only match below "data/2024", so start there.
        let start_dir = match prefix.rfind('/') {
            Some(idx) => self.root.join(&prefix[..idx]),
            None => self.root.clone(),
        };
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Same as S3: listing a prefix nothing lives under is
                    // an empty listing, not an error.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current.to_string_lossy())));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => {
                            yield Err(exn::Exn::from(Self::map_io_error(e, &current.to_string_lossy())));
                            continue 'entries;
                        },
                    };
                    match self.process_entry(entry, prefix).await {
                        Ok(WalkEntry::File(meta)) => yield Ok(meta),
                        Ok(WalkEntry::Descend(dir)) => stack.push(dir),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    }
                }
            }
        })
    }

    /// Sorted objects under `prefix`. A continuation resumes from the
    /// snapshot taken when the listing started, if it is still held.
    async fn sorted_listing(&self, prefix: &str, continuation: Option<&str>) -> Result<Listing> {
        if continuation.is_some()
            && let Some(listing) = self.listings.lock().await.get(prefix)
        {
            return Ok(Arc::clone(listing));
        }
        let mut all: Vec<ObjectMeta> = self.walk(prefix).try_collect().await?;
        all.sort_by(|a, b| a.key.cmp(&b.key));
        tracing::trace!(prefix, objects = all.len(), "walked directory");
        let listing: Listing = all.into();
        self.listings.lock().await.put(prefix.to_string(), Arc::clone(&listing));
        Ok(listing)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    #[tracing::instrument(skip(self), fields(store = %self.name))]
    async fn list_page(&self, prefix: &str, continuation: Option<&str>, max_keys: usize) -> Result<ListPage> {
        let prefix = validate_prefix(prefix)?;
        let listing = self.sorted_listing(&prefix, continuation).await?;
        let page = paginate(&listing, continuation, max_keys);
        if page.is_last() {
            self.listings.lock().await.pop(&prefix);
        }
        Ok(page)
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta> {
        let path = self.absolute_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| Self::map_io_error(e, key))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        }
        Ok(Self::meta(validate_key(key)?, &metadata))
    }

    async fn reader(&self, key: &str, hint: ReadHint) -> Result<BoxSyncRead> {
        let path = self.absolute_path(key)?;
        let file = fs::File::open(&path).await.map_err(|e| Self::map_io_error(e, key))?;
        if let Some(expected) = &hint.version {
            let metadata = file.metadata().await.map_err(|e| Self::map_io_error(e, key))?;
            if Self::etag(&metadata).as_ref() != Some(expected) {
                exn::bail!(ErrorKind::Modified(key.to_string()));
            }
        }
        Ok(Box::new(file.into_std().await))
    }
}
