//! Persistence collaborator for checkpoint, write, and blob rows.
//!
//! The external runtime owns all durable state; this crate only reads it.
//! [`CheckpointStore`] is the single capability interface the rest of the
//! crate consumes — engine-specific tuning is an internal concern of each
//! implementation and invisible to callers.
//!
//! Rows are normalized at this boundary: `metadata` and `channel_values`
//! always reach the core as JSON objects, never as duck-typed shapes.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Upper bound on `parent_checkpoint_id` hops before an ancestry walk is
/// declared cyclic.
pub const MAX_ANCESTRY_HOPS: usize = 1000;

/// One persisted checkpoint row, already normalized for the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub thread_id: String,
    #[serde(default)]
    pub checkpoint_ns: String,
    pub checkpoint_id: String,
    pub parent_checkpoint_id: Option<String>,
    /// Live channel state; always a JSON object.
    #[serde(default)]
    pub channel_values: Value,
    /// Channel version tokens; used only for ordering, never interpreted here.
    #[serde(default)]
    pub channel_versions: Value,
    #[serde(default)]
    pub versions_seen: Value,
    /// Free-form checkpoint metadata; always a JSON object.
    #[serde(default)]
    pub metadata: Value,
}

/// One recorded side-effect of a task during a checkpoint step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub task_id: String,
    #[serde(default)]
    pub task_path: String,
    pub idx: i64,
    pub channel: String,
    /// Encoding tag for `blob`; absent rows decode as structured-binary.
    pub encoding: Option<String>,
    pub blob: Vec<u8>,
}

/// A versioned binary snapshot of one channel's value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub channel: String,
    pub version: String,
    pub encoding: String,
    pub blob: Vec<u8>,
}

/// Per-thread listing entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub thread_id: String,
    pub checkpoint_count: u64,
    pub latest_checkpoint_id: Option<String>,
}

/// Pagination information for listing results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Total number of matching records
    pub total_count: u64,
    /// Number of records returned in this page
    pub page_size: u32,
    /// Zero-based offset of the first record in this page
    pub offset: u32,
    /// Whether there are more records after this page
    pub has_next_page: bool,
}

impl PageInfo {
    #[must_use]
    pub fn new(total_count: u64, page_size: usize, offset: u32) -> Self {
        Self {
            total_count,
            page_size: page_size as u32,
            offset,
            has_next_page: u64::from(offset) + (page_size as u64) < total_count,
        }
    }
}

/// Paginated checkpoint listing.
#[derive(Clone, Debug)]
pub struct CheckpointPage {
    pub checkpoints: Vec<CheckpointRecord>,
    pub page_info: PageInfo,
}

/// Paginated thread listing.
#[derive(Clone, Debug)]
pub struct ThreadPage {
    pub threads: Vec<ThreadInfo>,
    pub page_info: PageInfo,
}

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("store backend error: {message}")]
    #[diagnostic(
        code(tracevine::store::backend),
        help("Check the database URL and that the checkpoint tables exist.")
    )]
    Backend { message: String },

    #[error("corrupt row: {message}")]
    #[diagnostic(
        code(tracevine::store::corrupt),
        help("A persisted row could not be decoded into the expected shape.")
    )]
    Corrupt { message: String },

    #[error("ancestry walk for {thread_id}/{checkpoint_id} aborted after {hops} hops")]
    #[diagnostic(
        code(tracevine::store::ancestry_cycle),
        help("parent_checkpoint_id links form a cycle or an implausibly deep chain.")
    )]
    AncestryCycle {
        thread_id: String,
        checkpoint_id: String,
        hops: usize,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Read surface over the runtime's persisted checkpoint data.
///
/// All operations are pure queries. The default checkpoint ordering is
/// checkpoint id descending (newest first), matching the upstream runtime's
/// monotonically increasing ids.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Fetch a single checkpoint, `None` when absent.
    async fn get_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        checkpoint_ns: &str,
    ) -> Result<Option<CheckpointRecord>>;

    /// List a thread's checkpoints with pagination and total count.
    async fn list_checkpoints(
        &self,
        thread_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<CheckpointPage>;

    /// List a checkpoint's writes, ordered by `idx` ascending, optionally
    /// restricted to one task.
    async fn list_writes(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        checkpoint_ns: &str,
        task_id: Option<&str>,
    ) -> Result<Vec<WriteRecord>>;

    /// List channel blobs, optionally filtered by channel and version.
    async fn list_blobs(
        &self,
        thread_id: &str,
        checkpoint_ns: &str,
        channel: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<BlobRecord>>;

    /// List distinct thread ids with per-thread checkpoint counts and latest
    /// checkpoint ids.
    async fn list_threads(&self, limit: u32, offset: u32) -> Result<ThreadPage>;

    /// Walk the `parent_checkpoint_id` chain starting at `checkpoint_id`,
    /// returning the checkpoint and its ancestors, nearest first.
    ///
    /// The walk is bounded: revisiting an id or exceeding
    /// [`MAX_ANCESTRY_HOPS`] fails with [`StoreError::AncestryCycle`] instead
    /// of looping on corrupt data. A missing parent simply ends the chain.
    async fn ancestry(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        checkpoint_ns: &str,
    ) -> Result<Vec<CheckpointRecord>> {
        let mut chain = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut current = Some(checkpoint_id.to_string());

        while let Some(id) = current {
            if !seen.insert(id.clone()) || chain.len() >= MAX_ANCESTRY_HOPS {
                return Err(StoreError::AncestryCycle {
                    thread_id: thread_id.to_string(),
                    checkpoint_id: checkpoint_id.to_string(),
                    hops: chain.len(),
                });
            }
            let Some(record) = self.get_checkpoint(thread_id, &id, checkpoint_ns).await? else {
                break;
            };
            current = record.parent_checkpoint_id.clone();
            chain.push(record);
        }

        Ok(chain)
    }
}

/// Coerce a persisted JSON column into an object, treating anything else as
/// an empty map. This is the normalization step that keeps duck-typed shapes
/// out of the core.
#[must_use]
pub fn normalize_object(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        _ => Value::Object(serde_json::Map::new()),
    }
}
