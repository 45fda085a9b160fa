//! Offline evidence source serving a fixed JSON body.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{EvidenceSource, QueryRequest, SourceError};

/// Returns the same body for every request (mock runs and tests)
#[derive(Debug, Clone)]
pub struct StaticEvidenceSource {
    name: String,
    body: Value,
}

impl StaticEvidenceSource {
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Load the body from a JSON file
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        let body = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture: {}", path.display()))?;
        Ok(Self::new(name, body))
    }
}

#[async_trait]
impl EvidenceSource for StaticEvidenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _request: &QueryRequest, _timeout: Duration) -> Result<Value, SourceError> {
        Ok(self.body.clone())
    }
}
