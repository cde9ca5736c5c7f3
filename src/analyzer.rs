//! Thread-level orchestration of the trace builder and metrics calculator.
//!
//! Every call re-reads the store and rebuilds from scratch; nothing is cached
//! across calls. That trades recomputation for freshness and keeps the
//! analyzer free of shared mutable state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::metrics::{CostMetrics, MetricsCalculator, PerformanceMetrics, TokenUsage};
use crate::store::{CheckpointStore, StoreError};
use crate::trace::{TraceBuilder, builder::MESSAGES_CHANNEL};
use crate::utils::json_ext::element_count;

/// Cap on checkpoints fetched per thread analysis.
pub const THREAD_FETCH_LIMIT: u32 = 1000;

#[derive(Debug, Error, Diagnostic)]
pub enum AnalyzerError {
    #[error("checkpoint not found: {thread_id}/{checkpoint_id}")]
    #[diagnostic(
        code(tracevine::analyzer::not_found),
        help("Verify the thread id and checkpoint id against the store's thread listing.")
    )]
    CheckpointNotFound {
        thread_id: String,
        checkpoint_id: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Full metric summary of one checkpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub total_nodes: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub token_usage: TokenUsage,
    pub cost_metrics: CostMetrics,
    pub performance_metrics: PerformanceMetrics,
    pub created_at: DateTime<Utc>,
}

/// Aggregate over every analyzed checkpoint of a thread.
///
/// Totals are exact sums of the per-checkpoint values; averages divide by the
/// number of checkpoints actually analyzed. A thread with zero checkpoints is
/// a valid result, not an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadAnalysis {
    pub thread_id: String,
    pub checkpoint_count: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_duration_ms: f64,
    pub avg_tokens_per_checkpoint: f64,
    pub avg_cost_per_checkpoint: f64,
    pub checkpoints: Vec<ExecutionSummary>,
}

impl ThreadAnalysis {
    fn empty(thread_id: &str) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            checkpoint_count: 0,
            total_tokens: 0,
            total_cost: 0.0,
            total_duration_ms: 0.0,
            avg_tokens_per_checkpoint: 0.0,
            avg_cost_per_checkpoint: 0.0,
            checkpoints: Vec::new(),
        }
    }
}

/// Lightweight per-checkpoint entry for UI previews; no metric computation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub checkpoint_id: String,
    pub parent_checkpoint_id: Option<String>,
    pub metadata: Value,
    pub channel_count: usize,
    pub has_messages: bool,
}

/// Two full summaries plus signed deltas, second minus first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointComparison {
    pub first: ExecutionSummary,
    pub second: ExecutionSummary,
    pub token_diff: i64,
    pub cost_diff: f64,
    pub duration_diff_ms: f64,
    pub node_count_diff: i64,
}

/// Orchestrates store reads, trace building, and metric computation for one
/// execution thread at a time.
pub struct ThreadAnalyzer {
    store: Arc<dyn CheckpointStore>,
    builder: TraceBuilder,
    metrics: MetricsCalculator,
}

impl ThreadAnalyzer {
    #[must_use]
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            builder: TraceBuilder::default(),
            metrics: MetricsCalculator::default(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCalculator) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_builder(mut self, builder: TraceBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Analyze a single checkpoint: rebuild its trace and compute metrics.
    #[instrument(skip(self), err)]
    pub async fn analyze_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<ExecutionSummary> {
        let checkpoint = self
            .store
            .get_checkpoint(thread_id, checkpoint_id, "")
            .await?
            .ok_or_else(|| AnalyzerError::CheckpointNotFound {
                thread_id: thread_id.to_string(),
                checkpoint_id: checkpoint_id.to_string(),
            })?;

        let writes = self
            .store
            .list_writes(thread_id, checkpoint_id, "", None)
            .await?;
        let blobs = self.store.list_blobs(thread_id, "", None, None).await?;

        let graph = self.builder.build(&checkpoint, &writes, Some(&blobs));
        let token_usage = self.metrics.token_usage(&checkpoint.metadata, &graph);
        let cost_metrics = self.metrics.cost(&token_usage);
        let performance_metrics = self.metrics.performance(&graph);
        let (success_count, error_count) = self.metrics.status_counts(&graph);

        Ok(ExecutionSummary {
            thread_id: thread_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
            total_nodes: graph.nodes.len(),
            success_count,
            error_count,
            token_usage,
            cost_metrics,
            performance_metrics,
            created_at: Utc::now(),
        })
    }

    /// Analyze every checkpoint of a thread (up to [`THREAD_FETCH_LIMIT`])
    /// and aggregate the results.
    #[instrument(skip(self), err)]
    pub async fn analyze_thread(&self, thread_id: &str) -> Result<ThreadAnalysis> {
        let page = self
            .store
            .list_checkpoints(thread_id, THREAD_FETCH_LIMIT, 0)
            .await?;
        if page.checkpoints.is_empty() {
            return Ok(ThreadAnalysis::empty(thread_id));
        }

        let mut summaries = Vec::with_capacity(page.checkpoints.len());
        for checkpoint in &page.checkpoints {
            summaries.push(
                self.analyze_checkpoint(thread_id, &checkpoint.checkpoint_id)
                    .await?,
            );
        }

        let count = summaries.len();
        let total_tokens: u64 = summaries.iter().map(|s| s.token_usage.total_tokens).sum();
        let total_cost: f64 = summaries.iter().map(|s| s.cost_metrics.total_cost).sum();
        let total_duration_ms: f64 = summaries
            .iter()
            .map(|s| s.performance_metrics.total_duration_ms)
            .sum();

        Ok(ThreadAnalysis {
            thread_id: thread_id.to_string(),
            checkpoint_count: count,
            total_tokens,
            total_cost,
            total_duration_ms,
            avg_tokens_per_checkpoint: total_tokens as f64 / count as f64,
            avg_cost_per_checkpoint: total_cost / count as f64,
            checkpoints: summaries,
        })
    }

    /// Cheap per-checkpoint previews in store order, without building traces.
    #[instrument(skip(self), err)]
    pub async fn timeline(&self, thread_id: &str, limit: u32) -> Result<Vec<TimelineEntry>> {
        let page = self.store.list_checkpoints(thread_id, limit, 0).await?;
        Ok(page
            .checkpoints
            .into_iter()
            .map(|checkpoint| TimelineEntry {
                channel_count: element_count(&checkpoint.channel_values),
                has_messages: checkpoint.channel_values.get(MESSAGES_CHANNEL).is_some(),
                checkpoint_id: checkpoint.checkpoint_id,
                parent_checkpoint_id: checkpoint.parent_checkpoint_id,
                metadata: checkpoint.metadata,
            })
            .collect())
    }

    /// Compare two checkpoints of the same thread.
    #[instrument(skip(self), err)]
    pub async fn compare(
        &self,
        thread_id: &str,
        first_id: &str,
        second_id: &str,
    ) -> Result<CheckpointComparison> {
        let first = self.analyze_checkpoint(thread_id, first_id).await?;
        let second = self.analyze_checkpoint(thread_id, second_id).await?;

        Ok(CheckpointComparison {
            token_diff: second.token_usage.total_tokens as i64
                - first.token_usage.total_tokens as i64,
            cost_diff: second.cost_metrics.total_cost - first.cost_metrics.total_cost,
            duration_diff_ms: second.performance_metrics.total_duration_ms
                - first.performance_metrics.total_duration_ms,
            node_count_diff: second.total_nodes as i64 - first.total_nodes as i64,
            first,
            second,
        })
    }
}
