//! Canonical JSON encoding shared by checkpoint payloads and the
//! deterministic projection in `langgraph-core`.
//!
//! Canonical form: object keys sorted by UTF-8 byte order, no escaped
//! forward slashes, binary values base64-encoded, dates ISO-8601. This
//! is the encoding checkpoints are persisted under (`spec.md` §6,
//! "Persisted format") and the encoding the deterministic transcript and
//! state hashes are computed over (`spec.md` §4.6).

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Re-encode a JSON value with object keys sorted by UTF-8 byte order,
/// recursively. Array order is preserved — arrays are ordered data, not
/// sets, everywhere this codec is used.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize a value to its canonical JSON byte form. `serde_json`
/// never escapes `/`, and a `BTreeMap`-like sorted `Map` gives
/// deterministic key order, so this is exactly `to_vec` over the
/// canonicalized value.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&canonicalize(value)).expect("canonical JSON values always serialize")
}

/// SHA-256 of a value's canonical encoding, hex-encoded.
pub fn canonical_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(value));
    hex::encode(hasher.finalize())
}

/// Base64-encode bytes for embedding in a canonical JSON payload.
pub fn encode_bytes(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode a base64 string previously produced by [`encode_bytes`].
pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_nested_object_keys() {
        let value = json!({"b": 1, "a": {"z": 1, "y": 2}});
        let canon = canonicalize(&value);
        assert_eq!(
            serde_json::to_string(&canon).unwrap(),
            r#"{"a":{"y":2,"z":1},"b":1}"#
        );
    }

    #[test]
    fn preserves_array_order() {
        let value = json!({"xs": [3, 1, 2]});
        let canon = canonicalize(&value);
        assert_eq!(canon["xs"], json!([3, 1, 2]));
    }

    #[test]
    fn hash_is_stable_under_key_reordering() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn base64_round_trips() {
        let bytes = b"hello world";
        let encoded = encode_bytes(bytes);
        assert_eq!(decode_bytes(&encoded).unwrap(), bytes);
    }
}
