//! Enumeration strategies.
//!
//! Every strategy implements [`ObjectIterator`] and is shared by all
//! processors of one scan: each object is handed out to exactly one caller,
//! however many call [`next`](ObjectIterator::next) at once.

mod archive;
mod glob;
mod keys;
mod read_task;

pub use self::archive::ArchiveIterator;
pub use self::glob::GlobIterator;
pub use self::keys::KeysIterator;
pub use self::read_task::{ReadTask, ReadTaskIterator, ReadTaskSource};
use crate::archive::ArchiveOpener;
use crate::error::{ErrorKind, Result};
use crate::glob::{GlobMatcher, has_globs};
use crate::object::{FileProgress, ObjectInfo, ObjectInfoPtr, ProgressCallback, ReadKeys};
use crate::partition::{ObjectPredicate, VirtualColumns};
use async_trait::async_trait;
use std::sync::Arc;
use strata_config::ScanSettings;
use strata_storage::StoreHandle;

#[async_trait]
pub trait ObjectIterator: Send + Sync {
    /// The next unclaimed object, or `None` once enumeration is over.
    ///
    /// `processor` identifies the caller for logging only.
    async fn next(&self, processor: usize) -> Result<Option<ObjectInfoPtr>>;

    /// Best-effort number of objects this iterator will produce, for
    /// progress reporting.
    fn estimated_keys_count(&self) -> usize;
}

pub type IteratorHandle = Arc<dyn ObjectIterator>;

/// Callbacks applied to each object as it is enumerated.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Objects failing the predicate are skipped.
    pub predicate: Option<ObjectPredicate>,
    /// Receives every object handed out.
    pub read_keys: Option<ReadKeys>,
    /// Told the size of every object handed out, when known.
    pub progress: Option<ProgressCallback>,
}

impl Hooks {
    pub fn with_predicate(mut self, predicate: ObjectPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_read_keys(mut self, read_keys: ReadKeys) -> Self {
        self.read_keys = Some(read_keys);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub(crate) fn accepts(&self, object: &ObjectInfo) -> bool {
        self.predicate.as_ref().is_none_or(|predicate| predicate(&VirtualColumns::from_object(object)))
    }

    pub(crate) fn hand_out(&self, object: ObjectInfoPtr) -> ObjectInfoPtr {
        if let Some(read_keys) = &self.read_keys {
            read_keys.push(Arc::clone(&object));
        }
        if let Some(progress) = &self.progress
            && let Some(size) = object.size()
        {
            progress(FileProgress {
                read_bytes: 0,
                total_bytes_to_read: size,
            });
        }
        object
    }
}

/// What a scan reads: store paths (keys or globs), optionally naming a file
/// (or glob of files) inside each of them when they are archives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanTarget {
    pub paths: Vec<String>,
    pub path_in_archive: Option<String>,
}

impl ScanTarget {
    pub fn new(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            path_in_archive: None,
        }
    }

    pub fn with_path_in_archive(mut self, path_in_archive: impl Into<String>) -> Self {
        self.path_in_archive = Some(path_in_archive.into());
        self
    }
}

/// Collaborators and switches for [`create_file_iterator`].
#[derive(Clone, Default)]
pub struct IteratorOptions {
    pub hooks: Hooks,
    /// When set, objects come from a coordinator instead of the target paths.
    pub read_tasks: Option<Arc<dyn ReadTaskSource>>,
    /// Required for any scan reading inside archives.
    pub archive_opener: Option<Arc<dyn ArchiveOpener>>,
    /// Treat the path inside archives literally even if it has wildcards.
    pub ignore_archive_globs: bool,
}

impl IteratorOptions {
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_read_tasks(mut self, read_tasks: Arc<dyn ReadTaskSource>) -> Self {
        self.read_tasks = Some(read_tasks);
        self
    }

    pub fn with_archive_opener(mut self, opener: Arc<dyn ArchiveOpener>) -> Self {
        self.archive_opener = Some(opener);
        self
    }

    pub fn with_ignore_archive_globs(mut self, ignore: bool) -> Self {
        self.ignore_archive_globs = ignore;
        self
    }
}

/// Pick the enumeration strategy for a scan.
///
/// - coordinator tasks, when a [`ReadTaskSource`] is supplied;
/// - otherwise a listing-based [`GlobIterator`] if any path has wildcards,
///   else a [`KeysIterator`] over the paths as given;
/// - wrapped in an [`ArchiveIterator`] when the target names a path inside
///   archives.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use strata_config::ScanSettings;
/// use strata_scan::{IteratorOptions, ScanTarget, create_file_iterator};
/// use strata_storage::backend::LocalStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(LocalStore::new("local", std::env::temp_dir())?);
/// let target = ScanTarget::new(["events/*.csv"]);
/// let iterator = create_file_iterator(&target, &ScanSettings::default(), store, IteratorOptions::default())?;
/// assert_eq!(iterator.estimated_keys_count(), 0);
/// # Ok(())
/// # }
/// ```
pub fn create_file_iterator(
    target: &ScanTarget,
    settings: &ScanSettings,
    store: StoreHandle,
    options: IteratorOptions,
) -> Result<IteratorHandle> {
    if let Some(source) = options.read_tasks {
        tracing::debug!("enumerating objects from read tasks");
        let iterator = ReadTaskIterator::new(source, store, options.archive_opener, options.hooks);
        return Ok(Arc::new(iterator));
    }
    if target.paths.is_empty() {
        exn::bail!(ErrorKind::Configuration("no paths to scan".to_string()));
    }
    let (base_hooks, outer_hooks) = match target.path_in_archive {
        Some(_) => (Hooks::default(), options.hooks),
        None => (options.hooks, Hooks::default()),
    };
    let base: IteratorHandle = if target.paths.iter().any(|path| has_globs(path)) {
        tracing::debug!(paths = ?target.paths, "enumerating objects by listing");
        Arc::new(GlobIterator::new(Arc::clone(&store), &target.paths, settings, base_hooks)?)
    } else {
        tracing::debug!(keys = target.paths.len(), "enumerating explicit keys");
        Arc::new(KeysIterator::new(Arc::clone(&store), &target.paths, settings, base_hooks))
    };
    let Some(path_in_archive) = &target.path_in_archive else {
        return Ok(base);
    };
    let Some(opener) = options.archive_opener else {
        exn::bail!(ErrorKind::Configuration(format!("reading {path_in_archive} requires an archive opener")));
    };
    let mode = if has_globs(path_in_archive) && !options.ignore_archive_globs {
        InnerPath::Glob(GlobMatcher::new(path_in_archive)?)
    } else {
        InnerPath::Fixed(path_in_archive.clone())
    };
    Ok(Arc::new(ArchiveIterator::new(base, store, opener, mode, outer_hooks)))
}

/// Which files of each archive an [`ArchiveIterator`] yields.
#[derive(Debug, Clone)]
pub enum InnerPath {
    /// Exactly this file; archives without it are skipped.
    Fixed(String),
    /// Every file matching the pattern.
    Glob(GlobMatcher),
}
