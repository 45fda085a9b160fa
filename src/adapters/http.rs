//! HTTP evidence sources.
//!
//! Two kinds:
//! - `search`: GET `<endpoint>?q=<query>&limit=<top_k>`
//! - `chat_completion`: POST an OpenAI-style `messages` body asking the
//!   model for a JSON list of sources
//!
//! Auth: optional bearer token read from an environment variable.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{EvidenceSource, QueryRequest, SourceError};

const DEFAULT_INSTRUCTIONS: &str = "Return a JSON object {\"evidence\": [...]} listing up to {top_k} \
published sources relevant to the claim. Each entry has title, url and snippet. \
Return an empty list if you are unsure.";

/// Request style of an HTTP source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpSourceKind {
    Search,
    ChatCompletion,
}

/// Evidence source backed by a JSON HTTP API
pub struct HttpEvidenceSource {
    name: String,
    kind: HttpSourceKind,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
    instructions: Option<String>,
    client: reqwest::Client,
}

impl HttpEvidenceSource {
    pub fn new(name: impl Into<String>, kind: HttpSourceKind, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            endpoint: endpoint.into(),
            api_key: None,
            model: None,
            instructions: None,
            client: reqwest::Client::new(),
        }
    }

    /// Read the bearer token from `var`; the variable must be set.
    pub fn with_api_key_env(mut self, var: &str) -> Result<Self> {
        let key = std::env::var(var)
            .with_context(|| format!("{} environment variable required for source '{}'", var, self.name))?;
        self.api_key = Some(key);
        Ok(self)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    fn build(&self, request: &QueryRequest, timeout: Duration) -> reqwest::RequestBuilder {
        let builder = match self.kind {
            HttpSourceKind::Search => {
                let mut query: Vec<(String, String)> = vec![
                    ("q".to_string(), request.query.clone()),
                    ("limit".to_string(), request.top_k.to_string()),
                ];
                for (key, value) in &request.params {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    query.push((key.clone(), value));
                }
                self.client.get(&self.endpoint).query(&query)
            }
            HttpSourceKind::ChatCompletion => {
                let instructions = self
                    .instructions
                    .as_deref()
                    .unwrap_or(DEFAULT_INSTRUCTIONS)
                    .replace("{top_k}", &request.top_k.to_string());
                let mut body = json!({
                    "messages": [
                        {"role": "system", "content": instructions},
                        {"role": "user", "content": request.query},
                    ],
                });
                if let Some(ref model) = self.model {
                    body["model"] = json!(model);
                }
                if let Value::Object(ref mut map) = body {
                    for (key, value) in &request.params {
                        map.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
                self.client.post(&self.endpoint).json(&body)
            }
        };

        let builder = builder.timeout(timeout);
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl EvidenceSource for HttpEvidenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &QueryRequest, timeout: Duration) -> Result<Value, SourceError> {
        debug!(source = %self.name, endpoint = %self.endpoint, "HTTP evidence request");

        let response = self.build(request, timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(timeout)
            } else {
                // The URL carries query params; keep it out of the message
                SourceError::Network(e.without_url().to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                code: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| SourceError::Decode(e.to_string()))
    }
}
