#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use strata_scan::error::Result;
use strata_scan::{IteratorHandle, ReadTask, ReadTaskSource};
use tokio::sync::Mutex;

/// Build an uncompressed tar archive in memory.
pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_700_000_000);
        builder.append_data(&mut header, name, contents.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Drain `iterator` from `workers` concurrent tasks; returns every path
/// handed out, across all workers, in no particular order.
pub async fn drain_concurrently(iterator: IteratorHandle, workers: usize) -> Vec<String> {
    let handles: Vec<_> = (0..workers)
        .map(|processor| {
            let iterator = Arc::clone(&iterator);
            tokio::spawn(async move {
                let mut paths = Vec::new();
                while let Some(object) = iterator.next(processor).await.unwrap() {
                    paths.push(object.path().into_owned());
                    tokio::task::yield_now().await;
                }
                paths
            })
        })
        .collect();
    let mut all = Vec::new();
    for paths in futures::future::join_all(handles).await {
        all.extend(paths.unwrap());
    }
    all
}

/// Hands out pre-arranged batches, then empty batches forever.
pub struct ScriptedTasks {
    batches: Mutex<VecDeque<Vec<ReadTask>>>,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl ScriptedTasks {
    pub fn new(batches: impl IntoIterator<Item = Vec<ReadTask>>) -> Self {
        Self {
            batches: Mutex::new(batches.into_iter().collect()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReadTaskSource for ScriptedTasks {
    async fn next_tasks(&self) -> Result<Vec<ReadTask>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.batches.lock().await.pop_front().unwrap_or_default())
    }
}
