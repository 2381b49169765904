//! Canonical encoding and SHA-256 helpers.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Re-orders every object in `value` by key, recursively
///
/// The result serializes identically whichever map backend serde_json was
/// built with, so digests do not depend on field order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Compact JSON with sorted keys
pub fn canonical_string(value: Value) -> String {
    canonicalize(value).to_string()
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":[{"q":1,"p":2}]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":[{"p":2,"q":1}],"y":2},"b":1}"#).unwrap();

        assert_eq!(canonical_string(a.clone()), canonical_string(b));
        assert_eq!(canonical_string(a), r#"{"a":{"x":[{"p":2,"q":1}],"y":2},"b":1}"#);
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(&canonical_string(json!({}))
            .into_bytes()).len(), 64);
    }
}
