//! Token, cost, and latency metrics derived from trace graphs.
//!
//! Everything here is a pure function of a [`TraceGraph`] plus the
//! checkpoint's metadata; no I/O, no caching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::trace::{NodeStatus, TraceGraph, TraceNodeKind};
use crate::utils::json_ext::u64_at;

/// Default USD price per million prompt tokens.
pub const DEFAULT_PROMPT_PRICE_PER_MTOK: f64 = 3.0;
/// Default USD price per million completion tokens.
pub const DEFAULT_COMPLETION_PRICE_PER_MTOK: f64 = 15.0;

/// Linear per-million-token pricing. Currency is a fixed label, never
/// converted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pricing {
    pub prompt_per_mtok: f64,
    pub completion_per_mtok: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            prompt_per_mtok: DEFAULT_PROMPT_PRICE_PER_MTOK,
            completion_per_mtok: DEFAULT_COMPLETION_PRICE_PER_MTOK,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostMetrics {
    pub total_cost: f64,
    pub prompt_cost: f64,
    pub completion_cost: f64,
    pub currency: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_duration_ms: f64,
    pub llm_duration_ms: f64,
    pub tool_duration_ms: f64,
    /// Absent (not zero) when no `llm` node carried a duration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_llm_latency_ms: Option<f64>,
    /// Absent (not zero) when no `tool` node carried a duration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_tool_latency_ms: Option<f64>,
}

/// Computes metrics over built trace graphs.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsCalculator {
    pricing: Pricing,
}

impl MetricsCalculator {
    #[must_use]
    pub fn new(pricing: Pricing) -> Self {
        Self { pricing }
    }

    /// Sum token counts from the checkpoint metadata's `usage` block and from
    /// every node whose metadata carries a chat-style `usage_metadata` block.
    ///
    /// The two sources are summed, not deduplicated: a runtime that reports
    /// the same call in both places is counted twice. This best-effort policy
    /// is deliberate; callers needing exact accounting must normalize one
    /// source away upstream.
    #[must_use]
    pub fn token_usage(&self, checkpoint_metadata: &Value, graph: &TraceGraph) -> TokenUsage {
        let mut prompt_tokens = u64_at(checkpoint_metadata, "usage.prompt_tokens").unwrap_or(0);
        let mut completion_tokens =
            u64_at(checkpoint_metadata, "usage.completion_tokens").unwrap_or(0);

        for node in &graph.nodes {
            if let Some(prompt) = u64_at(&node.metadata, "usage_metadata.input_tokens") {
                prompt_tokens += prompt;
            }
            if let Some(completion) = u64_at(&node.metadata, "usage_metadata.output_tokens") {
                completion_tokens += completion;
            }
        }

        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Linear cost of a usage figure under the configured pricing.
    #[must_use]
    pub fn cost(&self, usage: &TokenUsage) -> CostMetrics {
        let prompt_cost = usage.prompt_tokens as f64 / 1_000_000.0 * self.pricing.prompt_per_mtok;
        let completion_cost =
            usage.completion_tokens as f64 / 1_000_000.0 * self.pricing.completion_per_mtok;
        CostMetrics {
            total_cost: prompt_cost + completion_cost,
            prompt_cost,
            completion_cost,
            currency: "USD".to_string(),
        }
    }

    /// Duration aggregates over all nodes, with per-category averages for
    /// `llm` and `tool` nodes. Averages are `None` when the category has no
    /// timed nodes.
    #[must_use]
    pub fn performance(&self, graph: &TraceGraph) -> PerformanceMetrics {
        let mut total = 0.0;
        let mut llm_duration = 0.0;
        let mut tool_duration = 0.0;
        let mut llm_count = 0u64;
        let mut tool_count = 0u64;

        for node in &graph.nodes {
            let Some(duration) = node.duration_ms else {
                continue;
            };
            total += duration;
            match node.kind {
                TraceNodeKind::Llm => {
                    llm_duration += duration;
                    llm_count += 1;
                }
                TraceNodeKind::Tool => {
                    tool_duration += duration;
                    tool_count += 1;
                }
                _ => {}
            }
        }

        PerformanceMetrics {
            total_duration_ms: total,
            llm_duration_ms: llm_duration,
            tool_duration_ms: tool_duration,
            avg_llm_latency_ms: (llm_count > 0).then(|| llm_duration / llm_count as f64),
            avg_tool_latency_ms: (tool_count > 0).then(|| tool_duration / tool_count as f64),
        }
    }

    /// Success and error node counts over the whole graph.
    #[must_use]
    pub fn status_counts(&self, graph: &TraceGraph) -> (usize, usize) {
        (
            graph.status_count(NodeStatus::Success),
            graph.status_count(NodeStatus::Error),
        )
    }
}
