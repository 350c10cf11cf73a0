//! # Canonical Hashing
//!
//! Order-independent content addressing for structured values.
//!
//! Maps are serialized with lexicographically sorted keys, arrays keep
//! their order, primitives use serde_json's fixed encoding. Every content
//! hash in the crate (fact hashes, explanation hashes, prompt checksums)
//! goes through this module.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Recursively sort object keys. Arrays keep their element order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut sorted = Map::new();
            for key in keys {
                if let Some(inner) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(inner));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact JSON text of the canonical form.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Digest of an already-materialized JSON value.
pub fn hash_value(value: &Value) -> String {
    sha256_hex(canonical_json(value))
}

/// Digest of any serializable value.
///
/// Fails only for values serde_json cannot represent (for example maps
/// with non-string keys); callers treat that as a programming error.
pub fn stable_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(hash_value(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"a": 1, "b": {"y": 2, "x": [1, 2]}});
        let b = json!({"b": {"x": [1, 2], "y": 2}, "a": 1});
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn test_array_order_matters() {
        let a = json!({"issues": ["one", "two"]});
        let b = json!({"issues": ["two", "one"]});
        assert_ne!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn test_canonical_json_is_sorted() {
        let value = json!({"z": true, "a": null, "m": {"k": 1, "c": 2}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":null,"m":{"c":2,"k":1},"z":true}"#
        );
    }

    #[test]
    fn test_digest_shape() {
        let digest = sha256_hex("factline");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_stable_hash_matches_value_hash() {
        #[derive(Serialize)]
        struct Core {
            loan_id: &'static str,
            score: u32,
        }

        let from_struct = stable_hash(&Core { loan_id: "L1", score: 72 }).unwrap();
        let from_value = hash_value(&json!({"score": 72, "loan_id": "L1"}));
        assert_eq!(from_struct, from_value);
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let value = json!({"loanId": "L1", "score": 85, "band": "GREEN"});
        let first = hash_value(&value);
        for _ in 0..5 {
            assert_eq!(hash_value(&value), first);
        }
    }
}
