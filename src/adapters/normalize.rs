//! Normalization of heterogeneous upstream bodies into `EvidenceItem`s.
//!
//! A body is first classified into a `ResponseShape`, then each shape is
//! normalized by its own function. Missing or mistyped optional fields
//! become empty defaults; only a body that matches no known shape at all is
//! rejected.

use serde_json::{Map, Value};

use crate::domain::EvidenceItem;

const ID_KEYS: &[&str] = &["id", "doi", "key"];
const URL_KEYS: &[&str] = &["url", "link", "href"];
const TITLE_KEYS: &[&str] = &["title", "name", "heading"];
const SNIPPET_KEYS: &[&str] = &["snippet", "summary", "abstract", "text", "content"];
const SCORE_KEYS: &[&str] = &["score", "relevance"];

/// Known upstream body shapes
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// `{"evidence": [...]}`
    Evidence(Vec<Value>),

    /// `{"results": [...]}`
    Results(Vec<Value>),

    /// `{"hits": [...]}`
    Hits(Vec<Value>),

    /// A bare array of items
    List(Vec<Value>),

    /// `{"choices": [{"message": {"content": "..."}}]}`
    ChatCompletion(Vec<String>),

    /// A single item object
    Single(Map<String, Value>),

    /// `null` or `{}`
    Null,
}

impl ResponseShape {
    /// Classify a raw body. Returns a reason when nothing matches.
    pub fn classify(body: Value) -> Result<Self, String> {
        match body {
            Value::Null => Ok(ResponseShape::Null),
            Value::Array(items) => Ok(ResponseShape::List(items)),
            Value::Object(mut map) => {
                if map.is_empty() {
                    return Ok(ResponseShape::Null);
                }
                for key in ["evidence", "results", "hits"] {
                    match map.remove(key) {
                        Some(Value::Array(items)) => {
                            return Ok(match key {
                                "evidence" => ResponseShape::Evidence(items),
                                "results" => ResponseShape::Results(items),
                                _ => ResponseShape::Hits(items),
                            })
                        }
                        Some(Value::Null) => return Ok(ResponseShape::Null),
                        Some(other) => {
                            return Err(format!("'{}' is {}, expected a list", key, kind(&other)))
                        }
                        None => {}
                    }
                }
                if let Some(choices) = map.get("choices") {
                    return Ok(ResponseShape::ChatCompletion(chat_contents(choices)));
                }
                if has_any_key(&map, &[TITLE_KEYS, SNIPPET_KEYS, URL_KEYS].concat()) {
                    return Ok(ResponseShape::Single(map));
                }
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                Err(format!("unrecognised object with keys {:?}", keys))
            }
            other => Err(format!("unexpected {} body", kind(&other))),
        }
    }
}

/// Normalize a raw body into at most `limit` unverified evidence items.
pub fn normalize_response(body: Value, source: &str, limit: usize) -> Result<Vec<EvidenceItem>, String> {
    let mut items = match ResponseShape::classify(body)? {
        ResponseShape::Null => Vec::new(),
        ResponseShape::Evidence(values)
        | ResponseShape::Results(values)
        | ResponseShape::Hits(values)
        | ResponseShape::List(values) => normalize_list(values),
        ResponseShape::Single(map) => vec![normalize_item(&map)],
        ResponseShape::ChatCompletion(contents) => normalize_chat(contents, source, limit)?,
    };

    items.truncate(limit);
    Ok(items
        .into_iter()
        .map(|item| item.with_source(source))
        .collect())
}

fn normalize_list(values: Vec<Value>) -> Vec<EvidenceItem> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(map) => Some(normalize_item(&map)),
            Value::String(text) if !text.trim().is_empty() => {
                Some(EvidenceItem::new("", "", "", text, 0.0))
            }
            _ => None,
        })
        .collect()
}

/// Chat content is either JSON (normalized recursively) or plain text.
fn normalize_chat(contents: Vec<String>, source: &str, limit: usize) -> Result<Vec<EvidenceItem>, String> {
    let mut items = Vec::new();
    for content in contents {
        let trimmed = strip_code_fence(&content);
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => {
                items.extend(normalize_response(parsed, source, limit)?)
            }
            _ => items.push(EvidenceItem::new("", "", "", trimmed, 0.0)),
        }
    }
    Ok(items)
}

/// Build one item from an object; `verification_status` from upstream is
/// ignored.
fn normalize_item(map: &Map<String, Value>) -> EvidenceItem {
    EvidenceItem::new(
        first_string(map, ID_KEYS),
        first_string(map, URL_KEYS),
        first_string(map, TITLE_KEYS),
        first_string(map, SNIPPET_KEYS),
        first_number(map, SCORE_KEYS),
    )
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn first_number(map: &Map<String, Value>, keys: &[&str]) -> f64 {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|score: &f64| score.is_finite())
        .unwrap_or(0.0)
}

fn chat_contents(choices: &Value) -> Vec<String> {
    choices
        .as_array()
        .map(|choices| {
            choices
                .iter()
                .filter_map(|choice| {
                    choice
                        .pointer("/message/content")
                        .or_else(|| choice.get("text"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn has_any_key(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|key| map.contains_key(*key))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
