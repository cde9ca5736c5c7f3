//! Small JSON helpers shared across the trace and realtime paths.

use serde_json::Value;

/// Get a value using a dot-separated path (e.g. `"usage.prompt_tokens"`).
///
/// Array segments are parsed as indices. Returns `None` as soon as any
/// segment is missing or the current value cannot be descended into.
///
/// # Examples
///
/// ```rust
/// use tracevine::utils::json_ext::get_by_path;
/// use serde_json::json;
///
/// let data = json!({"usage": {"prompt_tokens": 12}});
/// assert_eq!(get_by_path(&data, "usage.prompt_tokens"), Some(&json!(12)));
/// assert_eq!(get_by_path(&data, "usage.missing"), None);
/// ```
#[must_use]
pub fn get_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// A numeric path lookup, tolerating values persisted as either integers or
/// floats.
#[must_use]
pub fn u64_at(value: &Value, path: &str) -> Option<u64> {
    let found = get_by_path(value, path)?;
    found.as_u64().or_else(|| found.as_f64().map(|f| f as u64))
}

/// Check whether a value is an object containing all the given keys.
///
/// # Examples
///
/// ```rust
/// use tracevine::utils::json_ext::has_structure;
/// use serde_json::json;
///
/// let msg = json!({"type": "ai", "content": "hi"});
/// assert!(has_structure(&msg, &["type", "content"]));
/// assert!(!has_structure(&msg, &["tool_calls"]));
/// ```
#[must_use]
pub fn has_structure(value: &Value, expected_keys: &[&str]) -> bool {
    match value {
        Value::Object(obj) => expected_keys.iter().all(|key| obj.contains_key(*key)),
        _ => false,
    }
}

/// Number of elements for containers, `0` for everything else.
#[must_use]
pub fn element_count(value: &Value) -> usize {
    match value {
        Value::Object(obj) => obj.len(),
        Value::Array(arr) => arr.len(),
        _ => 0,
    }
}
