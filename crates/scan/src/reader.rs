//! Turning enumerated objects into row readers.

use crate::archive::BoxSyncRead;
use crate::error::{ErrorKind, Result};
use crate::format::{FormatContext, FormatHandle, RowReader, Rows};
use crate::iterator::IteratorHandle;
use crate::object::{ObjectInfo, ObjectInfoPtr};
use exn::ResultExt;
use std::sync::Arc;
use strata_cache::{CacheEntry, CacheHandle, CacheKey, Schema};
use strata_config::ScanSettings;
use strata_storage::StoreHandle;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;

/// Everything the processors of one scan share.
pub struct ReaderContext {
    pub store: StoreHandle,
    pub format: FormatHandle,
    pub cache: Option<CacheHandle>,
    pub settings: ScanSettings,
    /// Only row counts are wanted, not rows.
    pub need_only_count: bool,
    /// Bounds how many objects are being opened and turned into readers at
    /// once.
    pool: Arc<Semaphore>,
}

impl ReaderContext {
    pub fn new(store: StoreHandle, format: FormatHandle, settings: ScanSettings) -> Self {
        let pool = Arc::new(Semaphore::new(settings.reader_pool_size.max(1)));
        Self {
            store,
            format,
            cache: None,
            settings,
            need_only_count: false,
            pool,
        }
    }

    pub fn with_cache(mut self, cache: Option<CacheHandle>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_need_only_count(mut self, need_only_count: bool) -> Self {
        self.need_only_count = need_only_count;
        self
    }

    pub(crate) fn cache_key(&self, object: &ObjectInfo) -> CacheKey {
        let path_id = object.unique_identifier(&*self.store, self.settings.include_connection_info);
        CacheKey::new(path_id, self.format.name()).with_version(object.etag())
    }

    /// The cached entry for `object`, if one exists and still describes it.
    async fn lookup(&self, key: &CacheKey, object: &ObjectInfo) -> Option<CacheEntry> {
        let cache = self.cache.as_ref()?;
        if !self.settings.use_cache_for_count && !self.settings.use_cache_for_schema {
            return None;
        }
        match cache.get(key).await {
            Ok(Some(entry)) if entry.is_fresh(object.modified()) => Some(entry),
            Ok(Some(_)) => {
                tracing::debug!(%key, "cached entry is stale");
                None
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%key, error = ?err, "cache lookup failed");
                None
            },
        }
    }

    pub(crate) async fn remember(&self, key: &CacheKey, entry: CacheEntry) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.put(key, entry).await {
            Ok(()) => tracing::trace!(%key, "cached object facts"),
            Err(err) => tracing::warn!(%key, error = ?err, "cache update failed"),
        }
    }
}

pub(crate) enum Content {
    Rows {
        /// `None` only while a pull is in flight on the blocking pool.
        reader: Option<Box<dyn RowReader>>,
        schema_from_cache: bool,
    },
    Counted {
        num_rows: u64,
        from_cache: bool,
        emitted: bool,
    },
}

/// One object being read by one processor.
pub(crate) struct ReaderHolder {
    pub object: ObjectInfoPtr,
    pub cache_key: CacheKey,
    content: Content,
}

impl ReaderHolder {
    /// The next batch as `(num_rows, rows)`. Count-only holders report their
    /// count once, with no rows.
    pub async fn pull(&mut self) -> Result<Option<(u64, Rows)>> {
        match &mut self.content {
            Content::Counted { emitted: true, .. } => Ok(None),
            Content::Counted { num_rows, emitted, .. } => {
                *emitted = true;
                Ok((*num_rows > 0).then(|| (*num_rows, Rows::new())))
            },
            Content::Rows { reader, .. } => {
                let Some(mut taken) = reader.take() else {
                    exn::bail!(ErrorKind::Background);
                };
                let (taken, batch) = spawn_blocking(move || {
                    let batch = taken.next_batch();
                    (taken, batch)
                })
                .await
                .or_raise(|| ErrorKind::Background)?;
                *reader = Some(taken);
                let batch = batch.or_raise(|| ErrorKind::Decode(self.object.path().into_owned()))?;
                Ok(batch.map(|rows| (rows.len() as u64, rows)))
            },
        }
    }

    /// What the cache should learn once the object has been fully read.
    pub fn cache_update(&self, total_rows: u64) -> Option<CacheEntry> {
        let entry = CacheEntry::default().with_last_modified(self.object.modified());
        match &self.content {
            Content::Counted { from_cache: true, .. } => None,
            Content::Counted { num_rows, .. } => Some(entry.with_num_rows(*num_rows)),
            Content::Rows {
                reader,
                schema_from_cache,
            } => {
                let entry = entry.with_num_rows(total_rows);
                match reader.as_ref().and_then(|reader| reader.schema()) {
                    Some(schema) if !schema_from_cache => Some(entry.with_schema(schema)),
                    _ => Some(entry),
                }
            },
        }
    }
}

async fn open_stream(store: &StoreHandle, object: &ObjectInfoPtr) -> Result<BoxSyncRead> {
    match object.as_ref() {
        ObjectInfo::Stored(stored) => match store.reader(&stored.key, object.read_hint()).await {
            Ok(stream) => Ok(stream),
            Err(err) if err.is_not_found() => Err(err.raise(ErrorKind::ObjectNotFound(stored.key.clone()))),
            Err(err) => Err(err.raise(ErrorKind::Open(stored.key.clone()))),
        },
        ObjectInfo::InArchive(member) => {
            let reader = Arc::clone(&member.reader);
            let path = member.path_in_archive.clone();
            spawn_blocking(move || reader.read_file(&path))
                .await
                .or_raise(|| ErrorKind::Background)?
                .or_raise(|| ErrorKind::Open(object.path().into_owned()))
        },
    }
}

fn build_content(ctx: &ReaderContext, path: &str, stream: BoxSyncRead, schema_hint: Option<Schema>) -> Result<Content> {
    let (compression, stream) = ctx
        .settings
        .compression
        .wrap_reader(path, stream)
        .or_raise(|| ErrorKind::Decode(path.to_string()))?;
    tracing::trace!(path, %compression, "decoding object");
    let format_ctx = FormatContext {
        schema_hint,
        max_block_size: ctx.settings.max_block_size,
    };
    if ctx.need_only_count {
        let num_rows = ctx.format.count_rows(stream, &format_ctx).or_raise(|| ErrorKind::Decode(path.to_string()))?;
        return Ok(Content::Counted {
            num_rows,
            from_cache: false,
            emitted: false,
        });
    }
    let schema_from_cache = format_ctx.schema_hint.is_some();
    let reader = ctx.format.reader(stream, &format_ctx).or_raise(|| ErrorKind::Decode(path.to_string()))?;
    Ok(Content::Rows {
        reader: Some(reader),
        schema_from_cache,
    })
}

/// Pull objects from `iterator` until one yields a reader.
///
/// Objects are skipped when empty (if so configured) or when they vanished
/// and missing objects are tolerated. In count-only mode a cached count is
/// used without opening the object.
pub(crate) async fn create_reader(
    ctx: Arc<ReaderContext>,
    iterator: IteratorHandle,
    processor: usize,
) -> Result<Option<ReaderHolder>> {
    loop {
        let Some(object) = iterator.next(processor).await? else {
            return Ok(None);
        };
        if ctx.settings.skip_empty_files && object.size() == Some(0) {
            tracing::debug!(path = %object.path(), "skipping empty object");
            continue;
        }
        let cache_key = ctx.cache_key(&object);
        let cached = ctx.lookup(&cache_key, &object).await;
        if ctx.need_only_count
            && ctx.settings.use_cache_for_count
            && let Some(num_rows) = cached.as_ref().and_then(|entry| entry.num_rows)
        {
            tracing::debug!(path = %object.path(), num_rows, "row count served from cache");
            let content = Content::Counted {
                num_rows,
                from_cache: true,
                emitted: false,
            };
            return Ok(Some(ReaderHolder {
                object,
                cache_key,
                content,
            }));
        }
        // Held from opening the stream until the reader is built.
        let permit = Arc::clone(&ctx.pool).acquire_owned().await.or_raise(|| ErrorKind::Background)?;
        let stream = match open_stream(&ctx.store, &object).await {
            Ok(stream) => stream,
            Err(err) if err.is_not_found() && ctx.settings.ignore_non_existent_files => {
                tracing::warn!(path = %object.path(), "object vanished before it could be read; skipping");
                continue;
            },
            Err(err) => return Err(err),
        };
        let schema_hint = cached.and_then(|entry| entry.schema).filter(|_| ctx.settings.use_cache_for_schema);
        let build_ctx = Arc::clone(&ctx);
        let path = object.path().into_owned();
        let content = spawn_blocking(move || {
            let _permit = permit;
            build_content(&build_ctx, &path, stream, schema_hint)
        })
        .await
        .or_raise(|| ErrorKind::Background)??;
        tracing::debug!(path = %object.path(), processor, "reader ready");
        return Ok(Some(ReaderHolder {
            object,
            cache_key,
            content,
        }));
    }
}
