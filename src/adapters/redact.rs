//! Redaction of request descriptions before they reach the ledger.
//!
//! Secret-carrier fields are removed outright. Large free-text fields are
//! replaced by `sha256:<hex>` of their serialized content so the ledger can
//! still correlate identical requests without storing them in clear.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provenance::hash::{hash_value, sha256_hex};

/// Default field names removed from any redacted payload
pub const DEFAULT_SECRET_FIELDS: &[&str] = &[
    "api_key",
    "apikey",
    "api-key",
    "authorization",
    "token",
    "access_token",
    "secret",
    "client_secret",
    "password",
];

/// Default field names whose values are replaced by their hash
pub const DEFAULT_HASHED_FIELDS: &[&str] = &["html", "content", "body", "prompt"];

/// Redaction settings, matched case-insensitively against field names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redactor {
    #[serde(default = "default_secret_fields")]
    pub secret_fields: Vec<String>,

    #[serde(default = "default_hashed_fields")]
    pub hashed_fields: Vec<String>,
}

fn default_secret_fields() -> Vec<String> {
    DEFAULT_SECRET_FIELDS.iter().map(|s| s.to_string()).collect()
}

fn default_hashed_fields() -> Vec<String> {
    DEFAULT_HASHED_FIELDS.iter().map(|s| s.to_string()).collect()
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            secret_fields: default_secret_fields(),
            hashed_fields: default_hashed_fields(),
        }
    }
}

impl Redactor {
    /// Return a redacted copy of `value`, recursing into objects and arrays.
    pub fn redact(&self, value: &Value) -> Value {
        let secrets = lowercase_set(&self.secret_fields);
        let hashed = lowercase_set(&self.hashed_fields);
        redact_value(value, &secrets, &hashed)
    }

    /// Mask in `text` every value of a secret or hashed field in `params`.
    ///
    /// For free text built from a request (error messages, echoed bodies)
    /// that cannot be redacted structurally.
    pub fn scrub_text(&self, text: &str, params: &Map<String, Value>) -> String {
        let secrets = lowercase_set(&self.secret_fields);
        let hashed = lowercase_set(&self.hashed_fields);
        let mut scrubbed = text.to_string();

        for (key, value) in params {
            let lower = key.to_lowercase();
            if !secrets.contains(&lower) && !hashed.contains(&lower) {
                continue;
            }
            let needle = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            if !needle.is_empty() {
                scrubbed = scrubbed.replace(&needle, "[redacted]");
            }
        }
        scrubbed
    }

    /// Whether `value` still contains any secret-carrier field.
    pub fn contains_secret(&self, value: &Value) -> bool {
        let secrets = lowercase_set(&self.secret_fields);
        find_key(value, &secrets)
    }
}

fn redact_value(value: &Value, secrets: &HashSet<String>, hashed: &HashSet<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                let lower = key.to_lowercase();
                if secrets.contains(&lower) {
                    continue;
                }
                let redacted = if hashed.contains(&lower) {
                    Value::String(hash_marker(val))
                } else {
                    redact_value(val, secrets, hashed)
                };
                out.insert(key.clone(), redacted);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_value(item, secrets, hashed))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn hash_marker(value: &Value) -> String {
    let digest = match value {
        Value::String(s) => sha256_hex(s.as_bytes()),
        other => hash_value(other),
    };
    format!("sha256:{}", digest)
}

fn find_key(value: &Value, keys: &HashSet<String>) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(key, val)| keys.contains(&key.to_lowercase()) || find_key(val, keys)),
        Value::Array(items) => items.iter().any(|item| find_key(item, keys)),
        _ => false,
    }
}

fn lowercase_set(fields: &[String]) -> HashSet<String> {
    fields.iter().map(|f| f.to_lowercase()).collect()
}
