//! Instrumentation producer feeding the event broker.
//!
//! A [`RunRecorder`] sits inside the instrumented workload and emits one
//! [`RunEvent`] per lifecycle transition of a traced unit of work: model
//! calls, composite steps, and tool calls. Delivery is fire-and-forget —
//! publishing cannot fail, and nothing here panics into the workload.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::broker::{EventBroker, RunEvent, RunEventKind};
use crate::utils::json_ext::get_by_path;

/// Custom thread-id resolver over call metadata. Returning `None` falls
/// through to the next resolution stage.
pub type ThreadIdResolver = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Fresh run id for callers that do not bring their own.
#[must_use]
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

struct RunInfo {
    thread_id: String,
    started_at: DateTime<Utc>,
}

/// Records run lifecycles into an [`EventBroker`].
///
/// Thread-id resolution follows a strict priority ladder:
/// 1. the configured resolver function over call metadata,
/// 2. `configurable.thread_id` in the metadata (workflow config),
/// 3. a plain `thread_id` metadata field,
/// 4. the statically configured id,
/// 5. an id generated from the run id's first 8 characters
///    (`auto-<prefix>`), cached and reused for the rest of the run.
pub struct RunRecorder {
    broker: Arc<EventBroker>,
    static_thread_id: Option<String>,
    resolver: Option<ThreadIdResolver>,
    runs: Mutex<FxHashMap<String, RunInfo>>,
    cached_thread_id: Mutex<Option<String>>,
}

impl RunRecorder {
    #[must_use]
    pub fn new(broker: Arc<EventBroker>) -> Self {
        Self {
            broker,
            static_thread_id: None,
            resolver: None,
            runs: Mutex::new(FxHashMap::default()),
            cached_thread_id: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_static_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.static_thread_id = Some(thread_id.into());
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: ThreadIdResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    fn resolve_thread_id(&self, metadata: Option<&Value>, run_id: &str) -> String {
        if let (Some(resolver), Some(meta)) = (&self.resolver, metadata) {
            if let Some(resolved) = resolver(meta) {
                return resolved;
            }
        }

        if let Some(meta) = metadata {
            if let Some(id) = get_by_path(meta, "configurable.thread_id").and_then(Value::as_str) {
                return id.to_string();
            }
            if let Some(id) = meta.get("thread_id").and_then(Value::as_str) {
                return id.to_string();
            }
        }

        if let Some(id) = &self.static_thread_id {
            return id.clone();
        }

        let mut cached = self.cached_thread_id.lock().unwrap();
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }
        let prefix: String = run_id.chars().take(8).collect();
        let generated = format!("auto-{prefix}");
        *cached = Some(generated.clone());
        generated
    }

    fn begin(
        &self,
        kind: RunEventKind,
        run_id: &str,
        parent_run_id: Option<&str>,
        metadata: Option<&Value>,
        data: Value,
    ) {
        let thread_id = self.resolve_thread_id(metadata, run_id);
        self.runs.lock().unwrap().insert(
            run_id.to_string(),
            RunInfo {
                thread_id: thread_id.clone(),
                started_at: Utc::now(),
            },
        );

        let mut event = RunEvent::new(kind, run_id, thread_id).with_data(data);
        if let Some(parent) = parent_run_id {
            event = event.with_parent(parent);
        }
        self.broker.publish(event);
    }

    fn finish(
        &self,
        kind: RunEventKind,
        run_id: &str,
        parent_run_id: Option<&str>,
        data: Value,
    ) {
        // Errors also close the run: duration is only meaningful for ends.
        let info = self.runs.lock().unwrap().remove(run_id);
        let thread_id = match &info {
            Some(info) => info.thread_id.clone(),
            None => self.resolve_thread_id(None, run_id),
        };

        let mut event = RunEvent::new(kind, run_id, thread_id).with_data(data);
        if let Some(parent) = parent_run_id {
            event = event.with_parent(parent);
        }
        if !kind.is_error() {
            if let Some(info) = &info {
                let elapsed = Utc::now() - info.started_at;
                event = event.with_duration_ms(elapsed.num_microseconds().unwrap_or(0) as f64 / 1000.0);
            }
        }
        self.broker.publish(event);
    }

    // ----- model calls -----

    pub fn model_start(
        &self,
        run_id: &str,
        parent_run_id: Option<&str>,
        metadata: Option<&Value>,
        prompts: &[String],
    ) {
        self.begin(
            RunEventKind::LlmStart,
            run_id,
            parent_run_id,
            metadata,
            json!({
                "prompts": prompts,
                "metadata": metadata.cloned().unwrap_or(Value::Null),
            }),
        );
    }

    pub fn model_end(
        &self,
        run_id: &str,
        parent_run_id: Option<&str>,
        generations: Value,
        token_usage: Value,
    ) {
        self.finish(
            RunEventKind::LlmEnd,
            run_id,
            parent_run_id,
            json!({
                "generations": generations,
                "token_usage": token_usage,
            }),
        );
    }

    pub fn model_error(&self, run_id: &str, parent_run_id: Option<&str>, error: &str, error_kind: &str) {
        self.finish(
            RunEventKind::LlmError,
            run_id,
            parent_run_id,
            json!({"error": error, "error_type": error_kind}),
        );
    }

    // ----- composite steps -----

    pub fn step_start(
        &self,
        run_id: &str,
        parent_run_id: Option<&str>,
        metadata: Option<&Value>,
        inputs: Value,
    ) {
        self.begin(
            RunEventKind::ChainStart,
            run_id,
            parent_run_id,
            metadata,
            json!({
                "inputs": inputs,
                "metadata": metadata.cloned().unwrap_or(Value::Null),
            }),
        );
    }

    pub fn step_end(&self, run_id: &str, parent_run_id: Option<&str>, outputs: Value) {
        self.finish(
            RunEventKind::ChainEnd,
            run_id,
            parent_run_id,
            json!({"outputs": outputs}),
        );
    }

    pub fn step_error(&self, run_id: &str, parent_run_id: Option<&str>, error: &str, error_kind: &str) {
        self.finish(
            RunEventKind::ChainError,
            run_id,
            parent_run_id,
            json!({"error": error, "error_type": error_kind}),
        );
    }

    // ----- tool calls -----

    pub fn tool_start(
        &self,
        run_id: &str,
        parent_run_id: Option<&str>,
        metadata: Option<&Value>,
        input: &str,
    ) {
        self.begin(
            RunEventKind::ToolStart,
            run_id,
            parent_run_id,
            metadata,
            json!({
                "input": input,
                "metadata": metadata.cloned().unwrap_or(Value::Null),
            }),
        );
    }

    pub fn tool_end(&self, run_id: &str, parent_run_id: Option<&str>, output: &str) {
        self.finish(
            RunEventKind::ToolEnd,
            run_id,
            parent_run_id,
            json!({"output": output}),
        );
    }

    pub fn tool_error(&self, run_id: &str, parent_run_id: Option<&str>, error: &str, error_kind: &str) {
        self.finish(
            RunEventKind::ToolError,
            run_id,
            parent_run_id,
            json!({"error": error, "error_type": error_kind}),
        );
    }

    /// Number of runs currently open (started but not yet ended or errored).
    #[must_use]
    pub fn open_runs(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}
