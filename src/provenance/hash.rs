//! Canonical serialization and SHA-256 hashing of structured payloads.
//!
//! Canonical form: object keys sorted by byte order, no insignificant
//! whitespace (`,` and `:` separators), UTF-8. Two values that are equal as
//! JSON produce byte-identical output no matter how they were built.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value into its canonical byte form.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

/// Serialize any `Serialize` payload into canonical bytes.
pub fn canonicalize_payload<T: Serialize + ?Sized>(payload: &T) -> serde_json::Result<Vec<u8>> {
    let value = serde_json::to_value(payload)?;
    Ok(canonicalize(&value))
}

/// SHA-256 (lowercase hex) over the canonical form of `value`.
pub fn hash_value(value: &Value) -> String {
    sha256_hex(&canonicalize(value))
}

/// SHA-256 (lowercase hex) over the canonical form of any payload.
pub fn hash_payload<T: Serialize + ?Sized>(payload: &T) -> serde_json::Result<String> {
    Ok(sha256_hex(&canonicalize_payload(payload)?))
}

/// Plain SHA-256 of raw bytes as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Citation-integrity hash of an evidence snippet: sha256(snippet + url).
pub fn snippet_hash(snippet: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snippet.as_bytes());
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            // Sort explicitly; serde_json's map ordering depends on crate features.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(key.clone()), out);
                out.push(b':');
                write_canonical(val, out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out),
    }
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) {
    // Scalar serialization is infallible.
    if let Ok(bytes) = serde_json::to_vec(value) {
        out.extend_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_key_order_independent() {
        let mut a = serde_json::Map::new();
        a.insert("a".to_string(), json!(1));
        a.insert("b".to_string(), json!(2));

        let mut b = serde_json::Map::new();
        b.insert("b".to_string(), json!(2));
        b.insert("a".to_string(), json!(1));

        assert_eq!(hash_value(&Value::Object(a)), hash_value(&Value::Object(b)));
    }

    #[test]
    fn test_canonical_form_is_compact_and_sorted() {
        let value = json!({"zeta": [1, {"y": true, "x": null}], "alpha": "é"});
        let bytes = canonicalize(&value);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alpha":"é","zeta":[1,{"x":null,"y":true}]}"#
        );
    }

    #[test]
    fn test_hash_distinguishes_values() {
        assert_ne!(hash_value(&json!({"a": 1})), hash_value(&json!({"a": 2})));
        assert_ne!(hash_value(&json!([1, 2])), hash_value(&json!([2, 1])));
    }

    #[test]
    fn test_hash_payload_matches_value_hash() {
        #[derive(Serialize)]
        struct Sample {
            b: u32,
            a: &'static str,
        }

        let from_struct = hash_payload(&Sample { b: 2, a: "x" }).unwrap();
        let from_value = hash_value(&json!({"a": "x", "b": 2}));
        assert_eq!(from_struct, from_value);
        assert_eq!(from_struct.len(), 64);
    }

    #[test]
    fn test_snippet_hash_concatenates_snippet_and_url() {
        assert_eq!(snippet_hash("abc", "def"), sha256_hex(b"abcdef"));
        assert_ne!(snippet_hash("abc", "def"), snippet_hash("def", "abc"));
    }
}
