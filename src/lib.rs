//! # Tracevine: Checkpoint Trace Reconstruction & Realtime Run Streaming
//!
//! Tracevine turns persisted execution records ("checkpoints") produced by a
//! stateful agent-workflow runtime into inspectable execution traces,
//! cost/latency metrics, and a live per-thread event stream.
//!
//! ## Core Concepts
//!
//! - **Checkpoints**: immutable state snapshots read through a
//!   [`store::CheckpointStore`] — this crate never writes them.
//! - **Trace graphs**: derived node/edge views of one checkpoint's
//!   execution-visible activity, built by [`trace::TraceBuilder`].
//! - **Metrics**: token, cost, and latency aggregates computed by
//!   [`metrics::MetricsCalculator`] as pure functions of a graph.
//! - **Events**: realtime run lifecycle records fanned out by
//!   [`broker::EventBroker`] with bounded per-thread history.
//!
//! ## Quick Start
//!
//! ### Rebuilding a trace offline
//!
//! ```
//! use tracevine::store::CheckpointRecord;
//! use tracevine::trace::TraceBuilder;
//! use serde_json::json;
//!
//! let checkpoint = CheckpointRecord {
//!     thread_id: "thread-1".into(),
//!     checkpoint_ns: String::new(),
//!     checkpoint_id: "cp-1".into(),
//!     parent_checkpoint_id: None,
//!     channel_values: json!({"messages": [{"type": "human", "content": "hi"}]}),
//!     channel_versions: json!({}),
//!     versions_seen: json!({}),
//!     metadata: json!({"step": 0}),
//! };
//!
//! let graph = TraceBuilder::default().build(&checkpoint, &[], None);
//! assert_eq!(graph.nodes.len(), 1);
//! assert!(graph.edges.is_empty());
//! ```
//!
//! ### Streaming live run events
//!
//! ```
//! use tracevine::broker::{EventBroker, RunEvent, RunEventKind};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let broker = EventBroker::default();
//! let mut sub = broker.subscribe("thread-1");
//!
//! broker.publish(RunEvent::new(RunEventKind::ToolStart, "run-1", "thread-1"));
//!
//! let event = sub.recv().await.expect("event");
//! assert_eq!(event.kind, RunEventKind::ToolStart);
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`codec`] - Payload decoding for the three checkpoint blob encodings
//! - [`trace`] - Trace graph model and the per-checkpoint builder
//! - [`metrics`] - Token usage, cost, and latency calculations
//! - [`analyzer`] - Thread-level orchestration, timelines, and comparisons
//! - [`broker`] - Bounded realtime event fan-out per execution thread
//! - [`recorder`] - Instrumentation producer feeding the broker
//! - [`store`] - Persistence collaborator trait and its implementations
//! - [`config`] - Environment-driven settings

pub mod analyzer;
pub mod broker;
pub mod codec;
pub mod config;
pub mod metrics;
pub mod recorder;
pub mod store;
pub mod trace;
pub mod utils;
