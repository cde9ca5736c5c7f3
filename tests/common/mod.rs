#![allow(dead_code)]

use serde_json::{Value, json};
use tracevine::store::{BlobRecord, CheckpointRecord, WriteRecord};

/// A minimal checkpoint row with empty channels and metadata.
pub fn checkpoint(thread_id: &str, checkpoint_id: &str) -> CheckpointRecord {
    CheckpointRecord {
        thread_id: thread_id.to_string(),
        checkpoint_ns: String::new(),
        checkpoint_id: checkpoint_id.to_string(),
        parent_checkpoint_id: None,
        channel_values: json!({}),
        channel_versions: json!({}),
        versions_seen: json!({}),
        metadata: json!({}),
    }
}

pub fn checkpoint_with_messages(
    thread_id: &str,
    checkpoint_id: &str,
    messages: Value,
) -> CheckpointRecord {
    let mut record = checkpoint(thread_id, checkpoint_id);
    record.channel_values = json!({ "messages": messages });
    record
}

pub fn write(task_id: &str, idx: i64, channel: &str, encoding: Option<&str>, blob: &[u8]) -> WriteRecord {
    WriteRecord {
        task_id: task_id.to_string(),
        task_path: String::new(),
        idx,
        channel: channel.to_string(),
        encoding: encoding.map(str::to_string),
        blob: blob.to_vec(),
    }
}

pub fn blob(channel: &str, version: &str, encoding: &str, blob: &[u8]) -> BlobRecord {
    BlobRecord {
        channel: channel.to_string(),
        version: version.to_string(),
        encoding: encoding.to_string(),
        blob: blob.to_vec(),
    }
}

/// Structured-binary bytes for a JSON value.
pub fn msgpack(value: &Value) -> Vec<u8> {
    rmp_serde::to_vec(value).expect("msgpack encode")
}
