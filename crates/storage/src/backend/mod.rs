//! Object store trait and implementations.
//!
//! This module defines the [`ObjectStore`] trait, the read-side contract a
//! scan needs from a blob store, plus the backends shipped with this crate
//! (local filesystem, S3-compatible services, and an in-memory store for
//! tests).

mod local;
#[cfg(feature = "mock")]
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalStore;
#[cfg(feature = "mock")]
pub use self::memory::MemoryStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
use crate::error::Result;
use crate::models::{ListPage, ObjectMeta, ReadHint};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::io::Read;
use std::pin::Pin;

pub type ObjectMetaStream<'a> = Pin<Box<dyn Stream<Item = Result<ObjectMeta>> + Send + 'a>>;
pub type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Read-side interface of a blob store.
///
/// All keys are relative to the store root and are validated with
/// [`validate_key`](crate::validate_key) by implementations before use.
///
/// # Examples
///
/// ```no_run
/// use strata_storage::{ObjectStore, ReadHint, error::Result};
///
/// async fn open_if_present(store: &dyn ObjectStore, key: &str) -> Result<bool> {
///     if !store.exists(key).await? {
///         return Ok(false);
///     }
///     let meta = store.head(key).await?;
///     let _reader = store.reader(key, ReadHint::from(&meta)).await?;
///     Ok(true)
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured store (used for logging and as connection
    /// info when nothing more specific exists).
    fn name(&self) -> &str;

    /// Namespace objects live in: bucket for S3, root directory for the local
    /// backend. Part of every object's unique identity.
    fn namespace(&self) -> &str;

    /// Where the namespace is hosted (endpoint, host). Two stores with the
    /// same namespace but different connection info are different stores.
    fn connection_info(&self) -> &str {
        self.name()
    }

    /// List one page of objects whose keys start with `prefix`.
    ///
    /// Prefix matching is plain string matching, as with S3: `data/a` selects
    /// both `data/a.csv` and `data/abc/x.csv`. Keys are returned in
    /// lexicographic order. Pass the returned continuation back to fetch the
    /// next page.
    async fn list_page(&self, prefix: &str, continuation: Option<&str>, max_keys: usize) -> Result<ListPage>;

    /// Stream every object under `prefix`, fetching pages of `page_size`
    /// lazily.
    fn list_stream<'a>(&'a self, prefix: &'a str, page_size: usize) -> ObjectMetaStream<'a> {
        Box::pin(stream! {
            let mut continuation: Option<String> = None;
            loop {
                let page = match self.list_page(prefix, continuation.as_deref(), page_size).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                for meta in page.objects {
                    yield Ok(meta);
                }
                match page.continuation {
                    Some(next) => continuation = Some(next),
                    None => break,
                }
            }
        })
    }

    /// Collect every object under `prefix` into a [`Vec`].
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.list_stream(prefix, 1000).try_collect().await
    }

    /// Get object metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn head(&self, key: &str) -> Result<ObjectMeta>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Open an object for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`] suitable for use inside
    /// [`spawn_blocking`](tokio::task::spawn_blocking). The async setup
    /// (opening the file/connection) happens before returning. Returns
    /// [`NotFound`](crate::error::ErrorKind::NotFound) if the object does
    /// not exist, and [`Modified`](crate::error::ErrorKind::Modified) if
    /// `hint.version` is set and no longer matches the stored object.
    async fn reader(&self, key: &str, hint: ReadHint) -> Result<BoxSyncRead>;
}

/// Cut a sorted listing into one page, using the last key of the previous
/// page as continuation. Shared by backends without native pagination.
pub(crate) fn paginate(sorted: &[ObjectMeta], continuation: Option<&str>, max_keys: usize) -> ListPage {
    let max_keys = max_keys.max(1);
    let start = match continuation {
        Some(after) => sorted.partition_point(|meta| meta.key.as_str() <= after),
        None => 0,
    };
    let mut remaining = sorted[start..].iter().peekable();
    let objects: Vec<ObjectMeta> = remaining.by_ref().take(max_keys).cloned().collect();
    let continuation = match remaining.peek() {
        Some(_) => objects.last().map(|meta| meta.key.clone()),
        None => None,
    };
    ListPage { objects, continuation }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metas(keys: &[&str]) -> Vec<ObjectMeta> {
        keys.iter().map(|k| ObjectMeta::new(*k, 1, None)).collect()
    }

    #[test]
    fn test_paginate_resumes_after_continuation() {
        let all = metas(&["a", "b", "c", "d", "e"]);
        let first = paginate(&all, None, 2);
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.continuation.as_deref(), Some("b"));
        let second = paginate(&all, first.continuation.as_deref(), 2);
        assert_eq!(second.objects.iter().map(|m| m.key.as_str()).collect::<Vec<_>>(), ["c", "d"]);
        let third = paginate(&all, second.continuation.as_deref(), 2);
        assert_eq!(third.objects.len(), 1);
        assert!(third.is_last());
    }

    #[test]
    fn test_paginate_exact_fit_has_no_continuation() {
        let page = paginate(&metas(&["a", "b"]), None, 2);
        assert!(page.is_last());
    }

    #[test]
    fn test_paginate_empty() {
        let page = paginate(&[], None, 10);
        assert!(page.objects.is_empty());
        assert!(page.is_last());
    }
}
