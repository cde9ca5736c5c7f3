//! Realtime run event schema shared by the broker and the recorder.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle transition of a traced unit of work.
///
/// Three unit kinds (model call, composite step, tool call), each with
/// start/end/error transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    LlmStart,
    LlmEnd,
    LlmError,
    ChainStart,
    ChainEnd,
    ChainError,
    ToolStart,
    ToolEnd,
    ToolError,
}

impl RunEventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEventKind::LlmStart => "llm_start",
            RunEventKind::LlmEnd => "llm_end",
            RunEventKind::LlmError => "llm_error",
            RunEventKind::ChainStart => "chain_start",
            RunEventKind::ChainEnd => "chain_end",
            RunEventKind::ChainError => "chain_error",
            RunEventKind::ToolStart => "tool_start",
            RunEventKind::ToolEnd => "tool_end",
            RunEventKind::ToolError => "tool_error",
        }
    }

    /// True for the `*_error` transitions.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            RunEventKind::LlmError | RunEventKind::ChainError | RunEventKind::ToolError
        )
    }
}

impl fmt::Display for RunEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One realtime event, appended to its thread's history ring and fanned out
/// to live subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    #[serde(rename = "event_type")]
    pub kind: RunEventKind,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    pub thread_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub data: Value,
}

impl RunEvent {
    #[must_use]
    pub fn new(kind: RunEventKind, run_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            kind,
            run_id: run_id.into(),
            parent_run_id: None,
            thread_id: thread_id.into(),
            timestamp: Utc::now(),
            duration_ms: None,
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_run_id: impl Into<String>) -> Self {
        self.parent_run_id = Some(parent_run_id.into());
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Summary statistics for one thread's retained history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadEventSummary {
    pub thread_id: String,
    pub event_count: usize,
    pub event_types: FxHashMap<String, u64>,
    /// Wall-clock span from earliest to latest retained timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Best-effort sum of `data.token_usage.total_tokens` over `llm_end`
    /// events.
    pub total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl ThreadEventSummary {
    #[must_use]
    pub fn empty(thread_id: &str) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            event_count: 0,
            event_types: FxHashMap::default(),
            duration_ms: None,
            total_tokens: 0,
            start_time: None,
            end_time: None,
        }
    }
}

/// History export formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// One pretty-printed JSON array.
    Json,
    /// Newline-delimited JSON records.
    JsonLines,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "jsonl" => Ok(ExportFormat::JsonLines),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_serializes_as_event_type_string() {
        let event = RunEvent::new(RunEventKind::LlmEnd, "r1", "t1")
            .with_duration_ms(12.5)
            .with_data(json!({"token_usage": {"total_tokens": 5}}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], json!("llm_end"));
        assert_eq!(value["duration_ms"], json!(12.5));
        assert!(value.get("parent_run_id").is_none());
    }

    #[test]
    fn kind_roundtrips_through_serde() {
        for kind in [
            RunEventKind::LlmStart,
            RunEventKind::ChainError,
            RunEventKind::ToolEnd,
        ] {
            let s = serde_json::to_string(&kind).unwrap();
            let back: RunEventKind = serde_json::from_str(&s).unwrap();
            assert_eq!(back, kind);
            assert_eq!(s.trim_matches('"'), kind.as_str());
        }
    }

    #[test]
    fn error_kinds_are_flagged() {
        assert!(RunEventKind::ToolError.is_error());
        assert!(!RunEventKind::ToolEnd.is_error());
    }

    #[test]
    fn export_format_parses_known_tags_only() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!(
            "jsonl".parse::<ExportFormat>().unwrap(),
            ExportFormat::JsonLines
        );
        assert!("csv".parse::<ExportFormat>().is_err());
    }
}
