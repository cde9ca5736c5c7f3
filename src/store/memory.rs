//! Volatile in-memory store for tests and development.

use std::sync::RwLock;

use async_trait::async_trait;

use super::{
    BlobRecord, CheckpointPage, CheckpointRecord, CheckpointStore, PageInfo, Result, ThreadInfo,
    ThreadPage, WriteRecord,
};

#[derive(Debug, Clone)]
struct WriteRow {
    thread_id: String,
    checkpoint_ns: String,
    checkpoint_id: String,
    record: WriteRecord,
}

#[derive(Debug, Clone)]
struct BlobRow {
    thread_id: String,
    checkpoint_ns: String,
    record: BlobRecord,
}

/// Stores rows in plain vectors behind an `RwLock`. Listing semantics match
/// the SQLite store: checkpoints newest-id first, writes by `idx` ascending.
#[derive(Debug, Default)]
pub struct MemoryStore {
    checkpoints: RwLock<Vec<CheckpointRecord>>,
    writes: RwLock<Vec<WriteRow>>,
    blobs: RwLock<Vec<BlobRow>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_checkpoint(&self, record: CheckpointRecord) {
        self.checkpoints.write().unwrap().push(record);
    }

    pub fn insert_write(
        &self,
        thread_id: impl Into<String>,
        checkpoint_ns: impl Into<String>,
        checkpoint_id: impl Into<String>,
        record: WriteRecord,
    ) {
        self.writes.write().unwrap().push(WriteRow {
            thread_id: thread_id.into(),
            checkpoint_ns: checkpoint_ns.into(),
            checkpoint_id: checkpoint_id.into(),
            record,
        });
    }

    pub fn insert_blob(
        &self,
        thread_id: impl Into<String>,
        checkpoint_ns: impl Into<String>,
        record: BlobRecord,
    ) {
        self.blobs.write().unwrap().push(BlobRow {
            thread_id: thread_id.into(),
            checkpoint_ns: checkpoint_ns.into(),
            record,
        });
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        checkpoint_ns: &str,
    ) -> Result<Option<CheckpointRecord>> {
        let checkpoints = self.checkpoints.read().unwrap();
        Ok(checkpoints
            .iter()
            .find(|c| {
                c.thread_id == thread_id
                    && c.checkpoint_id == checkpoint_id
                    && c.checkpoint_ns == checkpoint_ns
            })
            .cloned())
    }

    async fn list_checkpoints(
        &self,
        thread_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<CheckpointPage> {
        let checkpoints = self.checkpoints.read().unwrap();
        let mut matching: Vec<CheckpointRecord> = checkpoints
            .iter()
            .filter(|c| c.thread_id == thread_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.checkpoint_id.cmp(&a.checkpoint_id));

        let total = matching.len() as u64;
        let page: Vec<CheckpointRecord> = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        let page_info = PageInfo::new(total, page.len(), offset);
        Ok(CheckpointPage {
            checkpoints: page,
            page_info,
        })
    }

    async fn list_writes(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        checkpoint_ns: &str,
        task_id: Option<&str>,
    ) -> Result<Vec<WriteRecord>> {
        let writes = self.writes.read().unwrap();
        let mut matching: Vec<WriteRecord> = writes
            .iter()
            .filter(|w| {
                w.thread_id == thread_id
                    && w.checkpoint_id == checkpoint_id
                    && w.checkpoint_ns == checkpoint_ns
                    && task_id.is_none_or(|t| w.record.task_id == t)
            })
            .map(|w| w.record.clone())
            .collect();
        matching.sort_by_key(|w| w.idx);
        Ok(matching)
    }

    async fn list_blobs(
        &self,
        thread_id: &str,
        checkpoint_ns: &str,
        channel: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<BlobRecord>> {
        let blobs = self.blobs.read().unwrap();
        Ok(blobs
            .iter()
            .filter(|b| {
                b.thread_id == thread_id
                    && b.checkpoint_ns == checkpoint_ns
                    && channel.is_none_or(|c| b.record.channel == c)
                    && version.is_none_or(|v| b.record.version == v)
            })
            .map(|b| b.record.clone())
            .collect())
    }

    async fn list_threads(&self, limit: u32, offset: u32) -> Result<ThreadPage> {
        let checkpoints = self.checkpoints.read().unwrap();
        let mut thread_ids: Vec<String> = checkpoints
            .iter()
            .map(|c| c.thread_id.clone())
            .collect::<rustc_hash::FxHashSet<_>>()
            .into_iter()
            .collect();
        thread_ids.sort_by(|a, b| b.cmp(a));

        let total = thread_ids.len() as u64;
        let threads: Vec<ThreadInfo> = thread_ids
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|thread_id| {
                let mut ids: Vec<&str> = checkpoints
                    .iter()
                    .filter(|c| c.thread_id == thread_id)
                    .map(|c| c.checkpoint_id.as_str())
                    .collect();
                ids.sort();
                ThreadInfo {
                    checkpoint_count: ids.len() as u64,
                    latest_checkpoint_id: ids.last().map(|s| s.to_string()),
                    thread_id,
                }
            })
            .collect();

        let page_info = PageInfo::new(total, threads.len(), offset);
        Ok(ThreadPage { threads, page_info })
    }
}
