//! Realtime event fan-out with bounded per-thread history.
//!
//! The broker is the one subsystem in this crate with shared mutable state.
//! It is a plain value the embedder owns (typically behind an [`std::sync::Arc`])
//! and passes to whatever drives the transport layer; there is no process-wide
//! instance.

pub mod event;
pub mod hub;

pub use event::{ExportFormat, RunEvent, RunEventKind, ThreadEventSummary};
pub use hub::{BrokerConfig, BrokerError, EventBroker, SubscriberId, Subscription};
