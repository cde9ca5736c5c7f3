use std::sync::Arc;

use serde_json::json;
use tracevine::analyzer::{AnalyzerError, ThreadAnalyzer};
use tracevine::store::{CheckpointStore, MemoryStore, StoreError};

mod common;
use common::*;

fn analyzer_over(store: MemoryStore) -> ThreadAnalyzer {
    ThreadAnalyzer::new(Arc::new(store))
}

fn usage_metadata(prompt: u64, completion: u64) -> serde_json::Value {
    json!({"usage": {"prompt_tokens": prompt, "completion_tokens": completion}})
}

#[tokio::test]
async fn missing_checkpoint_is_not_found() {
    let analyzer = analyzer_over(MemoryStore::new());
    let err = analyzer.analyze_checkpoint("t1", "nope").await.unwrap_err();
    assert!(matches!(
        err,
        AnalyzerError::CheckpointNotFound { checkpoint_id, .. } if checkpoint_id == "nope"
    ));
}

#[tokio::test]
async fn checkpoint_summary_counts_nodes_and_tokens() {
    let store = MemoryStore::new();
    let mut cp = checkpoint_with_messages(
        "t1",
        "c1",
        json!([{"type": "human", "content": "hi"}, {"type": "ai", "content": "yo"}]),
    );
    cp.metadata = usage_metadata(100, 40);
    store.insert_checkpoint(cp);
    store.insert_write(
        "t1",
        "",
        "c1",
        write("task1", 0, "out", Some("text-json"), br#"{"x": 1}"#),
    );

    let summary = analyzer_over(store)
        .analyze_checkpoint("t1", "c1")
        .await
        .expect("summary");

    assert_eq!(summary.total_nodes, 3);
    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.token_usage.prompt_tokens, 100);
    assert_eq!(summary.token_usage.completion_tokens, 40);
    assert!(summary.cost_metrics.total_cost > 0.0);
}

#[tokio::test]
async fn corrupt_write_shows_up_as_error_count_not_failure() {
    let store = MemoryStore::new();
    store.insert_checkpoint(checkpoint("t1", "c1"));
    store.insert_write("t1", "", "c1", write("bad", 0, "out", None, b"\xc1"));
    store.insert_write(
        "t1",
        "",
        "c1",
        write("good", 1, "out", Some("text-json"), b"2"),
    );

    let summary = analyzer_over(store)
        .analyze_checkpoint("t1", "c1")
        .await
        .expect("summary");
    assert_eq!(summary.total_nodes, 2);
    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.error_count, 1);
}

#[tokio::test]
async fn empty_thread_yields_zero_analysis_not_error() {
    let analysis = analyzer_over(MemoryStore::new())
        .analyze_thread("ghost")
        .await
        .expect("analysis");
    assert_eq!(analysis.checkpoint_count, 0);
    assert_eq!(analysis.total_tokens, 0);
    assert!(analysis.checkpoints.is_empty());
    assert_eq!(analysis.avg_tokens_per_checkpoint, 0.0);
}

#[tokio::test]
async fn thread_totals_are_exact_sums_of_checkpoint_values() {
    let store = MemoryStore::new();
    for (id, prompt, completion) in [("c1", 100u64, 10u64), ("c2", 200, 20), ("c3", 300, 30)] {
        let mut cp = checkpoint("t1", id);
        cp.metadata = usage_metadata(prompt, completion);
        store.insert_checkpoint(cp);
    }

    let analysis = analyzer_over(store)
        .analyze_thread("t1")
        .await
        .expect("analysis");

    assert_eq!(analysis.checkpoint_count, 3);
    assert_eq!(analysis.total_tokens, 660);
    assert!((analysis.avg_tokens_per_checkpoint - 220.0).abs() < 1e-9);

    let expected_cost: f64 = analysis
        .checkpoints
        .iter()
        .map(|s| s.cost_metrics.total_cost)
        .sum();
    assert!((analysis.total_cost - expected_cost).abs() < 1e-12);
}

#[tokio::test]
async fn timeline_reports_channels_without_computing_metrics() {
    let store = MemoryStore::new();
    let mut first = checkpoint_with_messages("t1", "c1", json!([{"type": "human", "content": "x"}]));
    first.channel_values["state"] = json!({"k": 1});
    store.insert_checkpoint(first);
    let mut second = checkpoint("t1", "c2");
    second.parent_checkpoint_id = Some("c1".into());
    store.insert_checkpoint(second);

    let timeline = analyzer_over(store).timeline("t1", 100).await.expect("timeline");

    // Store order: newest checkpoint id first.
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].checkpoint_id, "c2");
    assert_eq!(timeline[0].parent_checkpoint_id.as_deref(), Some("c1"));
    assert!(!timeline[0].has_messages);
    assert_eq!(timeline[0].channel_count, 0);

    assert_eq!(timeline[1].checkpoint_id, "c1");
    assert!(timeline[1].has_messages);
    assert_eq!(timeline[1].channel_count, 2);
}

#[tokio::test]
async fn compare_reports_signed_deltas_second_minus_first() {
    let store = MemoryStore::new();
    let mut small = checkpoint("t1", "c1");
    small.metadata = usage_metadata(100, 0);
    store.insert_checkpoint(small);

    let mut large = checkpoint_with_messages("t1", "c2", json!([{"type": "ai", "content": "z"}]));
    large.metadata = usage_metadata(300, 0);
    store.insert_checkpoint(large);

    let analyzer = analyzer_over(store);
    let comparison = analyzer.compare("t1", "c1", "c2").await.expect("compare");
    assert_eq!(comparison.token_diff, 200);
    assert_eq!(comparison.node_count_diff, 1);
    assert!(comparison.cost_diff > 0.0);

    let reversed = analyzer.compare("t1", "c2", "c1").await.expect("compare");
    assert_eq!(reversed.token_diff, -200);
    assert_eq!(reversed.node_count_diff, -1);

    let err = analyzer.compare("t1", "c1", "missing").await.unwrap_err();
    assert!(matches!(err, AnalyzerError::CheckpointNotFound { .. }));
}

#[tokio::test]
async fn ancestry_walk_stops_at_roots_and_rejects_cycles() {
    let store = MemoryStore::new();
    let mut c1 = checkpoint("t1", "c1");
    c1.parent_checkpoint_id = None;
    store.insert_checkpoint(c1);
    let mut c2 = checkpoint("t1", "c2");
    c2.parent_checkpoint_id = Some("c1".into());
    store.insert_checkpoint(c2);
    let mut c3 = checkpoint("t1", "c3");
    c3.parent_checkpoint_id = Some("c2".into());
    store.insert_checkpoint(c3);

    let chain = store.ancestry("t1", "c3", "").await.expect("chain");
    let ids: Vec<&str> = chain.iter().map(|c| c.checkpoint_id.as_str()).collect();
    assert_eq!(ids, vec!["c3", "c2", "c1"]);

    // Corrupt lineage: a <-> b.
    let cyclic = MemoryStore::new();
    let mut a = checkpoint("t1", "a");
    a.parent_checkpoint_id = Some("b".into());
    cyclic.insert_checkpoint(a);
    let mut b = checkpoint("t1", "b");
    b.parent_checkpoint_id = Some("a".into());
    cyclic.insert_checkpoint(b);

    let err = cyclic.ancestry("t1", "a", "").await.unwrap_err();
    assert!(matches!(err, StoreError::AncestryCycle { .. }));
}
