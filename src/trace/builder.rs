//! Builds a [`TraceGraph`] from one checkpoint's rows.
//!
//! The build is total: a malformed write or blob degrades to a single
//! error-status node and never aborts the rest of the graph.

use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::codec;
use crate::store::{BlobRecord, CheckpointRecord, WriteRecord};

use super::graph::{TraceEdge, TraceGraph, TraceNode, TraceNodeKind};

/// Character limit for blob previews before truncation.
pub const DEFAULT_PREVIEW_LIMIT: usize = 200;

/// Name of the channel holding the conversation message list.
pub const MESSAGES_CHANNEL: &str = "messages";

const START_MARKER_CHANNEL: &str = "__start";
const END_MARKER_CHANNEL: &str = "__end";

/// Reconstructs the execution trace of a single checkpoint.
///
/// Node order is deterministic: messages first (channel order), then task
/// writes (ascending `idx`), then blobs (row order, deduplicated by
/// channel/version). Edges form a linear `"next"` chain over that order —
/// they encode temporal adjacency, not causal dependency; causal structure is
/// only implicit in node metadata.
#[derive(Clone, Debug)]
pub struct TraceBuilder {
    preview_limit: usize,
}

impl Default for TraceBuilder {
    fn default() -> Self {
        Self {
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

impl TraceBuilder {
    #[must_use]
    pub fn new(preview_limit: usize) -> Self {
        Self { preview_limit }
    }

    /// Build the trace graph for `checkpoint` from its write log and,
    /// optionally, its channel blobs.
    #[must_use]
    pub fn build(
        &self,
        checkpoint: &CheckpointRecord,
        writes: &[WriteRecord],
        blobs: Option<&[BlobRecord]>,
    ) -> TraceGraph {
        let mut nodes = Vec::new();

        self.push_message_nodes(checkpoint, &mut nodes);
        self.push_task_nodes(checkpoint, writes, &mut nodes);
        if let Some(blobs) = blobs {
            self.push_blob_nodes(checkpoint, blobs, &mut nodes);
        }

        let edges = chain_edges(&nodes);
        let metadata = match &checkpoint.metadata {
            Value::Object(_) => checkpoint.metadata.clone(),
            _ => json!({}),
        };

        TraceGraph {
            thread_id: checkpoint.thread_id.clone(),
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            nodes,
            edges,
            metadata,
        }
    }

    fn push_message_nodes(&self, checkpoint: &CheckpointRecord, nodes: &mut Vec<TraceNode>) {
        let Some(messages) = checkpoint
            .channel_values
            .get(MESSAGES_CHANNEL)
            .and_then(Value::as_array)
        else {
            return;
        };

        for (idx, message) in messages.iter().enumerate() {
            let id = format!("{}_msg_{idx}", checkpoint.checkpoint_id);
            let node = match message {
                Value::Object(obj) => {
                    let name = obj
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    let mut node = TraceNode::new(id, TraceNodeKind::Message, name)
                        .with_metadata(message.clone());
                    if let Some(content) = obj.get("content") {
                        node = node.with_input(content.clone());
                    }
                    node
                }
                other => TraceNode::new(id, TraceNodeKind::Message, "unknown")
                    .with_input(other.clone())
                    .with_metadata(other.clone()),
            };
            nodes.push(node);
        }
    }

    fn push_task_nodes(
        &self,
        checkpoint: &CheckpointRecord,
        writes: &[WriteRecord],
        nodes: &mut Vec<TraceNode>,
    ) {
        let mut ordered: Vec<&WriteRecord> = writes.iter().collect();
        ordered.sort_by_key(|w| w.idx);

        for write in ordered {
            let id = format!("{}_{}_{}", checkpoint.checkpoint_id, write.task_id, write.idx);
            let metadata = json!({
                "task_id": write.task_id,
                "task_path": write.task_path,
                "channel": write.channel,
            });
            let node = TraceNode::new(id, TraceNodeKind::Task, &write.channel)
                .with_metadata(metadata);

            let node = match codec::decode_write(&write.blob, write.encoding.as_deref()) {
                Ok(Value::Null) => node,
                Ok(data) => node.with_input(data),
                Err(err) => node.with_error(err.to_string()),
            };
            nodes.push(node);
        }
    }

    fn push_blob_nodes(
        &self,
        checkpoint: &CheckpointRecord,
        blobs: &[BlobRecord],
        nodes: &mut Vec<TraceNode>,
    ) {
        // Deduplicate by channel:version, last record winning but keeping the
        // first occurrence's position so rebuild order stays stable.
        let mut order: Vec<String> = Vec::new();
        let mut by_key: FxHashMap<String, &BlobRecord> = FxHashMap::default();
        for blob in blobs {
            let key = format!("{}:{}", blob.channel, blob.version);
            if by_key.insert(key.clone(), blob).is_none() {
                order.push(key);
            }
        }

        for key in order {
            let blob = by_key[&key];
            match codec::decode(&blob.blob, &blob.encoding) {
                Err(err) => {
                    let id = format!("{}_blob_error_{key}", checkpoint.checkpoint_id);
                    nodes.push(
                        TraceNode::new(id, TraceNodeKind::Blob, format!("blob_{}", blob.channel))
                            .with_error(err.to_string())
                            .with_metadata(json!({
                                "channel": blob.channel,
                                "version": blob.version,
                                "type": blob.encoding,
                            })),
                    );
                }
                Ok(data) => {
                    let id = format!("{}_blob_{key}", checkpoint.checkpoint_id);
                    let (kind, name) = classify_blob_channel(&blob.channel);
                    let has_data = !data.is_null();
                    let mut node = TraceNode::new(id, kind, name).with_metadata(json!({
                        "channel": blob.channel,
                        "version": blob.version,
                        "type": blob.encoding,
                        "has_data": has_data,
                    }));
                    if has_data {
                        let rendered = data.to_string();
                        node = node.with_input(json!({
                            "channel": blob.channel,
                            "version": blob.version,
                            "blob_type": blob.encoding,
                            "data_size_bytes": rendered.len(),
                            "preview": preview(&rendered, self.preview_limit),
                        }));
                    }
                    nodes.push(node);
                }
            }
        }
    }
}

fn classify_blob_channel(channel: &str) -> (TraceNodeKind, String) {
    match channel {
        MESSAGES_CHANNEL => (TraceNodeKind::MessagesSnapshot, MESSAGES_CHANNEL.to_string()),
        START_MARKER_CHANNEL | END_MARKER_CHANNEL => {
            (TraceNodeKind::CheckpointMarker, channel.to_string())
        }
        other => (TraceNodeKind::Blob, other.to_string()),
    }
}

/// Truncate a rendered payload to `limit` characters, appending an ellipsis
/// marker when anything was cut.
fn preview(rendered: &str, limit: usize) -> String {
    if rendered.chars().count() <= limit {
        return rendered.to_string();
    }
    let mut out: String = rendered.chars().take(limit).collect();
    out.push_str("...");
    out
}

/// Linear `"next"` chain over consecutive node pairs.
fn chain_edges(nodes: &[TraceNode]) -> Vec<TraceEdge> {
    nodes
        .windows(2)
        .map(|pair| TraceEdge {
            source: pair[0].id.clone(),
            target: pair[1].id.clone(),
            label: Some("next".to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_respects_char_boundaries() {
        let rendered = "é".repeat(300);
        let out = preview(&rendered, 200);
        assert_eq!(out.chars().count(), 203);
        assert!(out.ends_with("..."));

        let short = preview("abc", 200);
        assert_eq!(short, "abc");
    }

    #[test]
    fn marker_channels_classify_exactly() {
        assert_eq!(
            classify_blob_channel("__start").0,
            TraceNodeKind::CheckpointMarker
        );
        assert_eq!(
            classify_blob_channel("__end").0,
            TraceNodeKind::CheckpointMarker
        );
        assert_eq!(
            classify_blob_channel("messages").0,
            TraceNodeKind::MessagesSnapshot
        );
        assert_eq!(classify_blob_channel("scratch").0, TraceNodeKind::Blob);
    }

    #[test]
    fn chain_edges_link_consecutive_nodes() {
        let nodes = vec![
            TraceNode::new("a", TraceNodeKind::Task, "x"),
            TraceNode::new("b", TraceNodeKind::Task, "y"),
            TraceNode::new("c", TraceNodeKind::Task, "z"),
        ];
        let edges = chain_edges(&nodes);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].source, "a");
        assert_eq!(edges[0].target, "b");
        assert_eq!(edges[1].source, "b");
        assert_eq!(edges[1].target, "c");
        assert!(edges.iter().all(|e| e.label.as_deref() == Some("next")));
    }

    #[test]
    fn no_nodes_means_no_edges() {
        assert!(chain_edges(&[]).is_empty());
    }
}
