//! Derived trace model for one checkpoint's execution-visible activity.
//!
//! Nothing in this module is persisted: trace graphs are rebuilt from store
//! records on every request, trading recomputation for freshness.

pub mod builder;
pub mod graph;

pub use builder::{DEFAULT_PREVIEW_LIMIT, TraceBuilder};
pub use graph::{NodeStatus, TraceEdge, TraceGraph, TraceNode, TraceNodeKind};
