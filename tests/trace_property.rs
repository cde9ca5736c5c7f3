use proptest::prelude::*;
use serde_json::{Value, json};
use tracevine::trace::TraceBuilder;

mod common;
use common::*;

proptest! {
    /// For any mix of messages and writes, edge count is exactly
    /// max(N - 1, 0) and every edge references ids present in the node list.
    #[test]
    fn edge_count_matches_node_count(message_count in 0usize..20, write_count in 0usize..20) {
        let messages: Vec<Value> = (0..message_count)
            .map(|i| json!({"type": "ai", "content": format!("m{i}")}))
            .collect();
        let cp = checkpoint_with_messages("t", "c", Value::Array(messages));
        let writes: Vec<_> = (0..write_count)
            .map(|i| write("task", i as i64, "out", Some("text-json"), format!("{i}").as_bytes()))
            .collect();

        let graph = TraceBuilder::default().build(&cp, &writes, None);

        prop_assert_eq!(graph.nodes.len(), message_count + write_count);
        prop_assert_eq!(graph.edges.len(), graph.nodes.len().saturating_sub(1));

        let ids: std::collections::HashSet<&str> =
            graph.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &graph.edges {
            prop_assert!(ids.contains(edge.source.as_str()));
            prop_assert!(ids.contains(edge.target.as_str()));
            prop_assert_eq!(edge.label.as_deref(), Some("next"));
        }
    }

    /// Rebuilding from identical inputs yields identical node id sequences.
    #[test]
    fn rebuild_is_idempotent(write_count in 1usize..15) {
        let cp = checkpoint("t", "c");
        let writes: Vec<_> = (0..write_count)
            .map(|i| write(&format!("task{}", i % 3), i as i64, "out", Some("text-json"), b"1"))
            .collect();

        let builder = TraceBuilder::default();
        let first: Vec<String> = builder
            .build(&cp, &writes, None)
            .nodes
            .into_iter()
            .map(|n| n.id)
            .collect();
        let second: Vec<String> = builder
            .build(&cp, &writes, None)
            .nodes
            .into_iter()
            .map(|n| n.id)
            .collect();
        prop_assert_eq!(first, second);
    }
}
