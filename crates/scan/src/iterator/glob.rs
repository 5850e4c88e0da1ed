use crate::error::{ErrorKind, Result};
use crate::glob::{expand_braces, glob_to_regex, listing_prefix};
use crate::iterator::{Hooks, ObjectIterator};
use crate::object::{ObjectInfo, ObjectInfoPtr};
use async_trait::async_trait;
use exn::ResultExt;
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_config::ScanSettings;
use strata_storage::StoreHandle;
use tokio::sync::Mutex;

/// One brace-free pattern and the listing that feeds it.
struct Expansion {
    prefix: String,
    matcher: Regex,
    continuation: Option<String>,
    started: bool,
}
impl Expansion {
    fn is_exhausted(&self) -> bool {
        self.started && self.continuation.is_none()
    }
}

#[derive(Default)]
struct GlobState {
    pending: VecDeque<Expansion>,
    buffer: VecDeque<ObjectInfoPtr>,
    /// Keys already buffered; overlapping expansions must not repeat them.
    seen: HashSet<String>,
    /// Keys the patterns matched, before the predicate.
    matched: usize,
    finished: bool,
}

/// Objects whose keys match one or more glob patterns, discovered by
/// listing.
///
/// Braces are expanded first and each expansion lists only below its own
/// literal prefix, so `logs/{2023,2024}/*.csv` issues two narrow listings
/// instead of one wide one. Pages are fetched lazily, one per refill, under
/// the iterator's lock.
pub struct GlobIterator {
    store: StoreHandle,
    description: String,
    page_size: usize,
    throw_on_zero_files_match: bool,
    hooks: Hooks,
    state: Mutex<GlobState>,
    buffered: AtomicUsize,
}

impl GlobIterator {
    pub fn new(store: StoreHandle, patterns: &[String], settings: &ScanSettings, hooks: Hooks) -> Result<Self> {
        let mut pending = VecDeque::new();
        let mut distinct = HashSet::new();
        for pattern in patterns {
            let pattern = pattern.trim_start_matches('/');
            for expanded in expand_braces(pattern)? {
                if !distinct.insert(expanded.clone()) {
                    continue;
                }
                pending.push_back(Expansion {
                    prefix: listing_prefix(&expanded).to_string(),
                    matcher: glob_to_regex(&expanded)?,
                    continuation: None,
                    started: false,
                });
            }
        }
        Ok(Self {
            store,
            description: patterns.join(", "),
            page_size: settings.list_object_keys_size.max(1),
            throw_on_zero_files_match: settings.throw_on_zero_files_match,
            hooks,
            state: Mutex::new(GlobState {
                pending,
                ..GlobState::default()
            }),
            buffered: AtomicUsize::new(0),
        })
    }

    /// Fetch one more page of the current expansion into the buffer, moving
    /// on to the next expansion when the current one is exhausted.
    async fn refill(&self, state: &mut GlobState) -> Result<()> {
        while state.pending.front().is_some_and(Expansion::is_exhausted) {
            state.pending.pop_front();
        }
        let GlobState {
            pending,
            buffer,
            seen,
            matched,
            finished,
        } = state;
        let Some(expansion) = pending.front_mut() else {
            *finished = true;
            if *matched == 0 && self.throw_on_zero_files_match {
                exn::bail!(ErrorKind::NoMatches(self.description.clone()));
            }
            tracing::debug!(patterns = %self.description, matched = *matched, "listing complete");
            return Ok(());
        };
        let page = self
            .store
            .list_page(&expansion.prefix, expansion.continuation.as_deref(), self.page_size)
            .await
            .or_raise(|| ErrorKind::Listing(expansion.prefix.clone()))?;
        tracing::debug!(prefix = %expansion.prefix, keys = page.objects.len(), "listed page");
        expansion.started = true;
        expansion.continuation = page.continuation;
        for meta in page.objects {
            if !expansion.matcher.is_match(&meta.key) || !seen.insert(meta.key.clone()) {
                continue;
            }
            *matched += 1;
            let object = ObjectInfo::from_meta(meta);
            if !self.hooks.accepts(&object) {
                continue;
            }
            buffer.push_back(Arc::new(object));
            self.buffered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectIterator for GlobIterator {
    async fn next(&self, _processor: usize) -> Result<Option<ObjectInfoPtr>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        loop {
            if let Some(object) = state.buffer.pop_front() {
                return Ok(Some(self.hooks.hand_out(object)));
            }
            if state.finished {
                return Ok(None);
            }
            self.refill(state).await?;
        }
    }

    fn estimated_keys_count(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }
}
