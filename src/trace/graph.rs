//! Node, edge, and graph types for reconstructed execution traces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Classifies what a trace node represents.
///
/// `Llm` and `Tool` do not arise from checkpoint rows directly; they exist for
/// graphs enriched with realtime run data and drive the per-category latency
/// averages in [`crate::metrics`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceNodeKind {
    /// One element of the checkpoint's `messages` channel.
    Message,
    /// One recorded task write.
    Task,
    /// A versioned channel snapshot.
    Blob,
    /// A blob of the `messages` channel itself.
    MessagesSnapshot,
    /// A blob of a start/end marker channel.
    CheckpointMarker,
    /// A model invocation (realtime-enriched graphs only).
    Llm,
    /// A tool invocation (realtime-enriched graphs only).
    Tool,
}

impl TraceNodeKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceNodeKind::Message => "message",
            TraceNodeKind::Task => "task",
            TraceNodeKind::Blob => "blob",
            TraceNodeKind::MessagesSnapshot => "messages_snapshot",
            TraceNodeKind::CheckpointMarker => "checkpoint_marker",
            TraceNodeKind::Llm => "llm",
            TraceNodeKind::Tool => "tool",
        }
    }
}

impl fmt::Display for TraceNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on a node. Decode failures degrade to `Error` nodes
/// instead of failing the build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Error,
}

impl NodeStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, NodeStatus::Success)
    }
}

/// One execution-visible unit: a message, a task write, or a channel snapshot.
///
/// Node ids are derived deterministically from the source row, so rebuilding
/// the same checkpoint always yields the same ids in the same order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TraceNodeKind,
    pub name: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub metadata: Value,
}

impl TraceNode {
    /// A successful node with no payload; callers fill in the optional fields.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: TraceNodeKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            status: NodeStatus::Success,
            input_data: None,
            output_data: None,
            error: None,
            duration_ms: None,
            metadata: Value::Null,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input_data = Some(input);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.status = NodeStatus::Error;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Directed edge between two nodes of the same graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEdge {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// The reconstructed trace of one checkpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceGraph {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub nodes: Vec<TraceNode>,
    pub edges: Vec<TraceEdge>,
    #[serde(default)]
    pub metadata: Value,
}

impl TraceGraph {
    /// Count of nodes with the given status.
    #[must_use]
    pub fn status_count(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }
}
