use std::sync::Arc;

use serde_json::json;
use tracevine::broker::{EventBroker, RunEventKind};
use tracevine::recorder::{RunRecorder, new_run_id};

fn recorder() -> (Arc<EventBroker>, RunRecorder) {
    let broker = Arc::new(EventBroker::default());
    let recorder = RunRecorder::new(Arc::clone(&broker));
    (broker, recorder)
}

#[tokio::test]
async fn model_lifecycle_emits_start_and_end_with_duration() {
    let (broker, recorder) = recorder();
    let run_id = new_run_id();
    let metadata = json!({"thread_id": "T"});

    recorder.model_start(&run_id, None, Some(&metadata), &["prompt one".into()]);
    assert_eq!(recorder.open_runs(), 1);

    recorder.model_end(
        &run_id,
        None,
        json!([["answer"]]),
        json!({"total_tokens": 12}),
    );
    assert_eq!(recorder.open_runs(), 0);

    let history = broker.history("T", None, 0);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, RunEventKind::LlmStart);
    assert_eq!(history[0].data["prompts"], json!(["prompt one"]));
    assert_eq!(history[1].kind, RunEventKind::LlmEnd);
    assert!(history[1].duration_ms.is_some());
    assert_eq!(history[1].data["token_usage"]["total_tokens"], json!(12));
}

#[tokio::test]
async fn errors_close_the_run_and_carry_the_kind_label() {
    let (broker, recorder) = recorder();
    recorder.tool_start("run-1", Some("parent-1"), Some(&json!({"thread_id": "T"})), "query");
    recorder.tool_error("run-1", Some("parent-1"), "socket closed", "IoError");

    assert_eq!(recorder.open_runs(), 0);
    let history = broker.history("T", None, 0);
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].kind, RunEventKind::ToolError);
    assert_eq!(history[1].parent_run_id.as_deref(), Some("parent-1"));
    assert_eq!(history[1].data["error"], json!("socket closed"));
    assert_eq!(history[1].data["error_type"], json!("IoError"));
    assert!(history[1].duration_ms.is_none());
}

#[tokio::test]
async fn step_events_use_the_same_thread_as_their_start() {
    let (broker, recorder) = recorder();
    recorder.step_start(
        "run-1",
        None,
        Some(&json!({"configurable": {"thread_id": "T-cfg"}})),
        json!({"question": "why"}),
    );
    // No metadata on end: the thread comes from the run map.
    recorder.step_end("run-1", None, json!({"answer": "because"}));

    let history = broker.history("T-cfg", None, 0);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, RunEventKind::ChainStart);
    assert_eq!(history[1].kind, RunEventKind::ChainEnd);
}

#[tokio::test]
async fn resolver_takes_priority_over_metadata_and_static_id() {
    let broker = Arc::new(EventBroker::default());
    let recorder = RunRecorder::new(Arc::clone(&broker))
        .with_static_thread_id("static-T")
        .with_resolver(Arc::new(|meta| {
            meta.get("user_id")
                .and_then(|v| v.as_str())
                .map(|u| format!("user-{u}"))
        }));

    let metadata = json!({"user_id": "42", "thread_id": "plain-T"});
    recorder.tool_start("run-1", None, Some(&metadata), "input");
    assert_eq!(broker.history("user-42", None, 0).len(), 1);
}

#[tokio::test]
async fn config_thread_id_beats_plain_metadata_field() {
    let (broker, recorder) = recorder();
    let metadata = json!({
        "configurable": {"thread_id": "from-config"},
        "thread_id": "from-metadata",
    });
    recorder.tool_start("run-1", None, Some(&metadata), "input");
    assert_eq!(broker.history("from-config", None, 0).len(), 1);
    assert!(broker.history("from-metadata", None, 0).is_empty());
}

#[tokio::test]
async fn static_id_applies_when_metadata_is_silent() {
    let broker = Arc::new(EventBroker::default());
    let recorder = RunRecorder::new(Arc::clone(&broker)).with_static_thread_id("static-T");
    recorder.tool_start("run-1", None, Some(&json!({"other": 1})), "input");
    assert_eq!(broker.history("static-T", None, 0).len(), 1);
}

#[tokio::test]
async fn generated_thread_id_is_cached_across_runs() {
    let (broker, recorder) = recorder();
    recorder.tool_start("abcdefgh-1234", None, None, "first");
    recorder.tool_start("zzzzzzzz-9999", None, None, "second");

    // The first run's generated id sticks for subsequent resolution.
    let history = broker.history("auto-abcdefgh", None, 0);
    assert_eq!(history.len(), 2);
    assert!(broker.history("auto-zzzzzzzz", None, 0).is_empty());
}
