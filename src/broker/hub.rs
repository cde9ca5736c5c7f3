//! The event broker: bounded per-thread history plus live subscriber fan-out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::time::timeout;

use crate::utils::json_ext::u64_at;

use super::event::{ExportFormat, RunEvent, RunEventKind, ThreadEventSummary};

/// Capacities for the broker's bounded buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Events retained per thread before the oldest is evicted.
    pub history_capacity: usize,
    /// Pending events per subscriber before new deliveries are dropped.
    pub subscriber_capacity: usize,
}

impl BrokerConfig {
    pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
    pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

    #[must_use]
    pub fn new(history_capacity: usize, subscriber_capacity: usize) -> Self {
        Self {
            history_capacity: history_capacity.max(1),
            subscriber_capacity: subscriber_capacity.max(1),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_HISTORY_CAPACITY,
            Self::DEFAULT_SUBSCRIBER_CAPACITY,
        )
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum BrokerError {
    #[error("unsupported export format: {format}")]
    #[diagnostic(
        code(tracevine::broker::unsupported_format),
        help("Supported formats: json, jsonl.")
    )]
    UnsupportedFormat { format: String },

    #[error("export serialization failed: {source}")]
    #[diagnostic(code(tracevine::broker::serialize))]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
}

/// Identifies one subscriber queue within its thread.
pub type SubscriberId = u64;

struct SubscriberEntry {
    id: SubscriberId,
    tx: flume::Sender<RunEvent>,
    // Receiver clone kept so `clear` can drain pending items; never polled
    // otherwise.
    drain_rx: flume::Receiver<RunEvent>,
}

#[derive(Default)]
struct ThreadChannel {
    ring: VecDeque<RunEvent>,
    subscribers: Vec<SubscriberEntry>,
    next_subscriber_id: SubscriberId,
}

/// In-process, thread-safe event bus keyed by execution-thread id.
///
/// Each thread's ring buffer and subscriber list live behind one mutex and
/// mutate as a unit; an outer read-write map guards only entry lookup, so
/// independent threads never contend. Publishing never blocks and never
/// fails the caller.
pub struct EventBroker {
    config: BrokerConfig,
    threads: RwLock<FxHashMap<String, Arc<Mutex<ThreadChannel>>>>,
    dropped_events: AtomicUsize,
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl EventBroker {
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            threads: RwLock::new(FxHashMap::default()),
            dropped_events: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn config(&self) -> BrokerConfig {
        self.config
    }

    /// Events dropped because a subscriber queue was full.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn channel(&self, thread_id: &str) -> Arc<Mutex<ThreadChannel>> {
        if let Some(existing) = self.threads.read().unwrap().get(thread_id) {
            return Arc::clone(existing);
        }
        let mut threads = self.threads.write().unwrap();
        Arc::clone(
            threads
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ThreadChannel::default()))),
        )
    }

    fn existing_channel(&self, thread_id: &str) -> Option<Arc<Mutex<ThreadChannel>>> {
        self.threads.read().unwrap().get(thread_id).cloned()
    }

    /// Append `event` to its thread's history ring and deliver a copy to
    /// every live subscriber.
    ///
    /// Backpressure policy: a subscriber whose queue is full loses the
    /// incoming (newest) event — producers are never blocked and the ring is
    /// unaffected. Subscribers whose handle was dropped are pruned here.
    pub fn publish(&self, event: RunEvent) {
        let channel = self.channel(&event.thread_id);
        let mut guard = channel.lock().unwrap();

        guard.ring.push_back(event.clone());
        while guard.ring.len() > self.config.history_capacity {
            guard.ring.pop_front();
        }

        let mut dropped = 0usize;
        guard.subscribers.retain(|entry| match entry.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(flume::TrySendError::Disconnected(_)) => false,
        });
        if dropped > 0 {
            self.dropped_events.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    /// Register a bounded queue for `thread_id` and return its handle.
    /// Returns immediately; the subscriber sees only events published after
    /// this call.
    #[must_use]
    pub fn subscribe(&self, thread_id: &str) -> Subscription {
        let channel = self.channel(thread_id);
        let mut guard = channel.lock().unwrap();
        let id = guard.next_subscriber_id;
        guard.next_subscriber_id += 1;

        let (tx, rx) = flume::bounded(self.config.subscriber_capacity);
        guard.subscribers.push(SubscriberEntry {
            id,
            tx,
            drain_rx: rx.clone(),
        });

        Subscription {
            thread_id: thread_id.to_string(),
            id,
            rx,
        }
    }

    /// Remove a subscriber queue. Unknown handles are a no-op, so calling
    /// this twice (or racing a dropped [`Subscription`]) is harmless.
    pub fn unsubscribe(&self, thread_id: &str, id: SubscriberId) {
        if let Some(channel) = self.existing_channel(thread_id) {
            channel.lock().unwrap().subscribers.retain(|s| s.id != id);
        }
    }

    /// Snapshot of the retained history in arrival order.
    #[must_use]
    pub fn history(
        &self,
        thread_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Vec<RunEvent> {
        let Some(channel) = self.existing_channel(thread_id) else {
            return Vec::new();
        };
        let guard = channel.lock().unwrap();
        guard
            .ring
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Number of retained events for a thread.
    #[must_use]
    pub fn event_count(&self, thread_id: &str) -> usize {
        self.existing_channel(thread_id)
            .map(|c| c.lock().unwrap().ring.len())
            .unwrap_or(0)
    }

    /// Thread ids currently holding buffered events.
    #[must_use]
    pub fn active_threads(&self) -> Vec<String> {
        let threads = self.threads.read().unwrap();
        threads
            .iter()
            .filter(|(_, channel)| !channel.lock().unwrap().ring.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Summary statistics over the retained history. A thread with no events
    /// yields an empty summary, never an error.
    #[must_use]
    pub fn summary(&self, thread_id: &str) -> ThreadEventSummary {
        let Some(channel) = self.existing_channel(thread_id) else {
            return ThreadEventSummary::empty(thread_id);
        };
        let guard = channel.lock().unwrap();
        if guard.ring.is_empty() {
            return ThreadEventSummary::empty(thread_id);
        }

        let mut event_types: FxHashMap<String, u64> = FxHashMap::default();
        let mut start_time = None;
        let mut end_time = None;
        let mut total_tokens = 0u64;

        for event in &guard.ring {
            *event_types.entry(event.kind.as_str().to_string()).or_insert(0) += 1;
            if start_time.is_none_or(|t| event.timestamp < t) {
                start_time = Some(event.timestamp);
            }
            if end_time.is_none_or(|t| event.timestamp > t) {
                end_time = Some(event.timestamp);
            }
            if event.kind == RunEventKind::LlmEnd {
                total_tokens += u64_at(&event.data, "token_usage.total_tokens").unwrap_or(0);
            }
        }

        let duration_ms = match (start_time, end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64),
            _ => None,
        };

        ThreadEventSummary {
            thread_id: thread_id.to_string(),
            event_count: guard.ring.len(),
            event_types,
            duration_ms,
            total_tokens,
            start_time,
            end_time,
        }
    }

    /// Empty the history ring and drain any items still pending in subscriber
    /// queues. Subscribers stay registered; the thread re-activates on the
    /// next publish or subscribe.
    pub fn clear(&self, thread_id: &str) {
        if let Some(channel) = self.existing_channel(thread_id) {
            let mut guard = channel.lock().unwrap();
            guard.ring.clear();
            for entry in &guard.subscribers {
                for _ in entry.drain_rx.drain() {}
            }
        }
    }

    /// Serialize the full retained history as a JSON array or as
    /// newline-delimited records.
    pub fn export(&self, thread_id: &str, format: &str) -> Result<String, BrokerError> {
        let format: ExportFormat =
            format
                .parse()
                .map_err(|format| BrokerError::UnsupportedFormat { format })?;
        let events = self.history(thread_id, None, 0);
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&events)?),
            ExportFormat::JsonLines => {
                let lines = events
                    .iter()
                    .map(serde_json::to_string)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(lines.join("\n"))
            }
        }
    }
}

/// A live subscriber's receiving handle.
///
/// Dropping the handle disconnects the queue; the broker prunes the dead
/// entry on the next publish. For eager removal call
/// [`EventBroker::unsubscribe`] with [`Subscription::id`].
pub struct Subscription {
    thread_id: String,
    id: SubscriberId,
    rx: flume::Receiver<RunEvent>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Await the next event. Returns `None` once the queue is unsubscribed
    /// and fully drained.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.rx.recv_async().await.ok()
    }

    /// Await the next event with a deadline, so transports can interleave
    /// idle heartbeats. `None` on timeout or disconnect.
    pub async fn next_timeout(&mut self, duration: Duration) -> Option<RunEvent> {
        match timeout(duration, self.rx.recv_async()).await {
            Ok(Ok(event)) => Some(event),
            _ => None,
        }
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Option<RunEvent> {
        self.rx.try_recv().ok()
    }

    /// Adapt the subscription into an async [`Stream`], ending when the
    /// queue disconnects. Convenient for SSE/WebSocket relay loops.
    ///
    /// [`Stream`]: futures_util::stream::Stream
    pub fn into_stream(self) -> impl futures_util::stream::Stream<Item = RunEvent> {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}
