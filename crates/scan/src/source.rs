//! The per-processor scan driver.

use crate::error::{ErrorKind, Result};
use crate::format::Rows;
use crate::iterator::IteratorHandle;
use crate::object::ObjectInfoPtr;
use crate::reader::{ReaderContext, ReaderHolder, create_reader};
use exn::ResultExt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Rows produced from one object.
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub num_rows: u64,
    /// Empty in count-only scans.
    pub rows: Rows,
    /// The object the rows came from, for virtual columns.
    pub source: ObjectInfoPtr,
}

/// Reads objects claimed from a shared iterator, one at a time, and emits
/// their rows in batches.
///
/// While the current object is being decoded, the next one is claimed and
/// opened in the background, so that listing and open latency overlap with
/// decoding. Several sources sharing one [`IteratorHandle`] split the work
/// between them.
pub struct ObjectStorageSource {
    name: String,
    processor: usize,
    ctx: Arc<ReaderContext>,
    iterator: IteratorHandle,
    reader: Option<ReaderHolder>,
    pending: Option<JoinHandle<Result<Option<ReaderHolder>>>>,
    initialized: bool,
    finished: bool,
    total_rows_in_file: u64,
    objects_read: usize,
}

impl ObjectStorageSource {
    pub fn new(name: impl Into<String>, processor: usize, ctx: Arc<ReaderContext>, iterator: IteratorHandle) -> Self {
        Self {
            name: name.into(),
            processor,
            ctx,
            iterator,
            reader: None,
            pending: None,
            initialized: false,
            finished: false,
            total_rows_in_file: 0,
            objects_read: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Object currently being read.
    pub fn current_object(&self) -> Option<&ObjectInfoPtr> {
        self.reader.as_ref().map(|holder| &holder.object)
    }

    /// The next batch of rows, or `None` once every object this source could
    /// claim has been read.
    pub async fn generate(&mut self) -> Result<Option<RowBatch>> {
        if self.finished {
            return Ok(None);
        }
        if !self.initialized {
            self.initialized = true;
            tracing::info!(source = %self.name, processor = self.processor, "starting scan");
            let first = create_reader(Arc::clone(&self.ctx), Arc::clone(&self.iterator), self.processor).await?;
            self.adopt(first);
        }
        loop {
            let Some(holder) = self.reader.as_mut() else {
                self.finished = true;
                tracing::info!(source = %self.name, objects = self.objects_read, "scan finished");
                return Ok(None);
            };
            match holder.pull().await? {
                Some((num_rows, rows)) if num_rows > 0 => {
                    self.total_rows_in_file += num_rows;
                    let source = Arc::clone(&holder.object);
                    return Ok(Some(RowBatch { num_rows, rows, source }));
                },
                Some(_) => continue,
                None => {
                    self.finish_current().await;
                    let next = self.take_pending().await?;
                    self.adopt(next);
                },
            }
        }
    }

    /// Stop early. The current object is released at once; a reader being
    /// built in the background is left to finish and then discarded.
    pub fn on_finish(&mut self) {
        self.reader = None;
        if self.pending.take().is_some() {
            tracing::debug!(source = %self.name, "detaching background reader");
        }
        self.finished = true;
    }

    fn adopt(&mut self, holder: Option<ReaderHolder>) {
        self.total_rows_in_file = 0;
        self.reader = holder;
        if let Some(holder) = &self.reader {
            tracing::debug!(source = %self.name, path = %holder.object.path(), "reading object");
            self.objects_read += 1;
            self.schedule_prefetch();
        }
    }

    fn schedule_prefetch(&mut self) {
        let ctx = Arc::clone(&self.ctx);
        let iterator = Arc::clone(&self.iterator);
        let processor = self.processor;
        self.pending = Some(tokio::spawn(create_reader(ctx, iterator, processor)));
    }

    async fn take_pending(&mut self) -> Result<Option<ReaderHolder>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        match pending.await.or_raise(|| ErrorKind::Background)? {
            Ok(holder) => Ok(holder),
            Err(err) => Err(err.raise(ErrorKind::Prefetch)),
        }
    }

    /// Record what was learned about the finished object and release it.
    async fn finish_current(&mut self) {
        let Some(holder) = self.reader.take() else {
            return;
        };
        if let Some(entry) = holder.cache_update(self.total_rows_in_file) {
            self.ctx.remember(&holder.cache_key, entry).await;
        }
    }
}
