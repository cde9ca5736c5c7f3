//! Read-only SQLite store over the runtime's native checkpoint tables.
//!
//! The workflow runtime owns the schema (`checkpoints`, `checkpoint_writes`,
//! `checkpoint_blobs`); this store never migrates or writes it. JSON columns
//! are normalized into plain objects at this boundary so the core only ever
//! sees well-shaped metadata.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use super::{
    BlobRecord, CheckpointPage, CheckpointRecord, CheckpointStore, PageInfo, Result, StoreError,
    ThreadInfo, ThreadPage, WriteRecord, normalize_object,
};

/// SQLite-backed [`CheckpointStore`].
///
/// Connections are pooled and shared; all queries are plain reads, so the
/// store is freely cloneable across tasks via [`Arc`].
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}

impl SqliteStore {
    /// Connect to the checkpoint database at `database_url`.
    /// Example URL: "sqlite://checkpoints.db"
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("connect error: {e}"),
            })?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Wrap an existing pool (useful when the embedder manages connections).
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn row_to_checkpoint(row: &SqliteRow) -> Result<CheckpointRecord> {
        let thread_id: String = row.get("thread_id");
        let checkpoint_ns: String = row.get("checkpoint_ns");
        let checkpoint_id: String = row.get("checkpoint_id");
        let parent_checkpoint_id: Option<String> = row.get("parent_checkpoint_id");

        let checkpoint_json: String = row.get("checkpoint");
        let metadata_json: Option<String> = row.get("metadata");

        let checkpoint: Value =
            serde_json::from_str(&checkpoint_json).map_err(|e| StoreError::Corrupt {
                message: format!("checkpoint column for {thread_id}/{checkpoint_id}: {e}"),
            })?;
        let metadata: Value = metadata_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Corrupt {
                message: format!("metadata column for {thread_id}/{checkpoint_id}: {e}"),
            })?
            .unwrap_or(Value::Null);

        let channel_values = normalize_object(
            checkpoint
                .get("channel_values")
                .cloned()
                .unwrap_or(Value::Null),
        );
        let channel_versions = normalize_object(
            checkpoint
                .get("channel_versions")
                .cloned()
                .unwrap_or(Value::Null),
        );
        let versions_seen = normalize_object(
            checkpoint
                .get("versions_seen")
                .cloned()
                .unwrap_or(Value::Null),
        );

        Ok(CheckpointRecord {
            thread_id,
            checkpoint_ns,
            checkpoint_id,
            parent_checkpoint_id,
            channel_values,
            channel_versions,
            versions_seen,
            metadata: normalize_object(metadata),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    #[instrument(skip(self), err)]
    async fn get_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        checkpoint_ns: &str,
    ) -> Result<Option<CheckpointRecord>> {
        let row = sqlx::query(
            r#"
            SELECT thread_id, checkpoint_ns, checkpoint_id, parent_checkpoint_id,
                   checkpoint, metadata
            FROM checkpoints
            WHERE thread_id = ?1 AND checkpoint_id = ?2 AND checkpoint_ns = ?3
            "#,
        )
        .bind(thread_id)
        .bind(checkpoint_id)
        .bind(checkpoint_ns)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select checkpoint: {e}"),
        })?;

        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_checkpoints(
        &self,
        thread_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<CheckpointPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("count checkpoints: {e}"),
            })?;

        let rows = sqlx::query(
            r#"
            SELECT thread_id, checkpoint_ns, checkpoint_id, parent_checkpoint_id,
                   checkpoint, metadata
            FROM checkpoints
            WHERE thread_id = ?1
            ORDER BY checkpoint_id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(thread_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select checkpoints: {e}"),
        })?;

        let checkpoints = rows
            .iter()
            .map(Self::row_to_checkpoint)
            .collect::<Result<Vec<_>>>()?;
        let page_info = PageInfo::new(total as u64, checkpoints.len(), offset);
        Ok(CheckpointPage {
            checkpoints,
            page_info,
        })
    }

    #[instrument(skip(self), err)]
    async fn list_writes(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        checkpoint_ns: &str,
        task_id: Option<&str>,
    ) -> Result<Vec<WriteRecord>> {
        let sql = if task_id.is_some() {
            r#"
            SELECT task_id, task_path, idx, channel, type, blob
            FROM checkpoint_writes
            WHERE thread_id = ?1 AND checkpoint_id = ?2 AND checkpoint_ns = ?3
              AND task_id = ?4
            ORDER BY idx ASC
            "#
        } else {
            r#"
            SELECT task_id, task_path, idx, channel, type, blob
            FROM checkpoint_writes
            WHERE thread_id = ?1 AND checkpoint_id = ?2 AND checkpoint_ns = ?3
            ORDER BY idx ASC
            "#
        };

        let mut query = sqlx::query(sql)
            .bind(thread_id)
            .bind(checkpoint_id)
            .bind(checkpoint_ns);
        if let Some(task) = task_id {
            query = query.bind(task);
        }

        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("select writes: {e}"),
            })?;

        Ok(rows
            .into_iter()
            .map(|row| WriteRecord {
                task_id: row.get("task_id"),
                task_path: row.get::<Option<String>, _>("task_path").unwrap_or_default(),
                idx: row.get("idx"),
                channel: row.get("channel"),
                encoding: row.get("type"),
                blob: row.get::<Option<Vec<u8>>, _>("blob").unwrap_or_default(),
            })
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn list_blobs(
        &self,
        thread_id: &str,
        checkpoint_ns: &str,
        channel: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<BlobRecord>> {
        let mut conditions = vec!["thread_id = ?1", "checkpoint_ns = ?2"];
        if channel.is_some() {
            conditions.push("channel = ?3");
        }
        if version.is_some() {
            conditions.push(if channel.is_some() {
                "version = ?4"
            } else {
                "version = ?3"
            });
        }
        let sql = format!(
            "SELECT channel, version, type, blob FROM checkpoint_blobs WHERE {} ORDER BY channel, version",
            conditions.join(" AND ")
        );

        let mut query = sqlx::query(&sql).bind(thread_id).bind(checkpoint_ns);
        if let Some(channel) = channel {
            query = query.bind(channel);
        }
        if let Some(version) = version {
            query = query.bind(version);
        }

        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("select blobs: {e}"),
            })?;

        Ok(rows
            .into_iter()
            .map(|row| BlobRecord {
                channel: row.get("channel"),
                version: row.get("version"),
                encoding: row.get("type"),
                blob: row.get::<Option<Vec<u8>>, _>("blob").unwrap_or_default(),
            })
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn list_threads(&self, limit: u32, offset: u32) -> Result<ThreadPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT thread_id) FROM checkpoints")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("count threads: {e}"),
            })?;

        let rows = sqlx::query(
            r#"
            SELECT thread_id,
                   COUNT(*) AS checkpoint_count,
                   MAX(checkpoint_id) AS latest_checkpoint_id
            FROM checkpoints
            GROUP BY thread_id
            ORDER BY thread_id DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select threads: {e}"),
        })?;

        let threads: Vec<ThreadInfo> = rows
            .into_iter()
            .map(|row| ThreadInfo {
                thread_id: row.get("thread_id"),
                checkpoint_count: row.get::<i64, _>("checkpoint_count") as u64,
                latest_checkpoint_id: row.get("latest_checkpoint_id"),
            })
            .collect();

        let page_info = PageInfo::new(total as u64, threads.len(), offset);
        Ok(ThreadPage { threads, page_info })
    }
}
