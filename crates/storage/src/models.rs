//! Storage models.
//!
//! These types are what a backend hands back from listing and `head`
//! calls, and what a caller may hand in when opening a stream.

use time::OffsetDateTime;

/// Object metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Key relative to the store root
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp, if the backend reports one
    pub modified: Option<OffsetDateTime>,
    /// Content version tag (S3 ETag or equivalent)
    pub etag: Option<String>,
}
impl ObjectMeta {
    /// Create metadata from a listing operation (no version tag).
    pub fn new(key: impl Into<String>, size: u64, modified: Option<OffsetDateTime>) -> Self {
        Self {
            key: key.into(),
            size,
            modified,
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// One page of a prefix listing.
///
/// `continuation` is opaque to callers; pass it back to
/// [`list_page`](crate::ObjectStore::list_page) to resume. `None` means the
/// listing is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    pub continuation: Option<String>,
}
impl ListPage {
    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}

/// What the caller already knows about an object it is about to open.
///
/// Backends may use the size to skip a metadata round-trip. A version pins
/// the read to the listed content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadHint {
    pub size: Option<u64>,
    pub version: Option<String>,
}
impl From<&ObjectMeta> for ReadHint {
    fn from(meta: &ObjectMeta) -> Self {
        Self {
            size: Some(meta.size),
            version: meta.etag.clone(),
        }
    }
}
