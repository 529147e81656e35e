//! Content hashing for goals and artifact specs
//!
//! All durable identity in sunwell is content-addressed: goals hash to a
//! `goal_hash` that groups cache entries, and artifact specs hash into the
//! `input_hash` that keys the execution cache. Hashing goes through
//! canonical JSON so logically-equal values always produce the same digest
//! regardless of field ordering.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Serialize a JSON value with recursively sorted object keys
///
/// `serde_json::Map` preserves insertion order, so two maps with the same
/// entries can serialize differently. Canonical form re-sorts every object
/// before serializing, making the output stable for hashing.
pub fn canonical_json(value: &Value) -> String {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by_key(|(k, _)| k.as_str());
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.clone(), canonicalize(v)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }

    serde_json::to_string(&canonicalize(value)).expect("canonical JSON is always serializable")
}

/// Normalize a goal string for hashing
///
/// Trims, lowercases, and collapses internal whitespace runs to single
/// spaces so minor edits ("Build  the parser" vs "build the parser") still
/// map to the same cache group.
pub fn normalize_goal(goal: &str) -> String {
    goal.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable identity of a top-level goal
///
/// `goal_hash = SHA256(normalize_goal(goal))`. Used to group executions in
/// the cache and to tag briefings.
pub fn goal_hash(goal: &str) -> String {
    sha256_hex(normalize_goal(goal).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_hex_known_value() {
        // SHA-256 of the empty string
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn test_canonical_json_preserves_arrays() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonical_json(&v), "[3,1,2]");
    }

    #[test]
    fn test_normalize_goal_collapses_whitespace() {
        assert_eq!(
            normalize_goal("  Build   the\tParser \n"),
            "build the parser"
        );
    }

    #[test]
    fn test_goal_hash_survives_minor_edits() {
        assert_eq!(goal_hash("Build hello module"), goal_hash("build  hello module "));
        assert_ne!(goal_hash("build hello module"), goal_hash("build goodbye module"));
    }
}
