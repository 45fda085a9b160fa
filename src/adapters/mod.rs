//! Adapter interfaces for external evidence sources.
//!
//! An `EvidenceSource` performs one raw request against one upstream and
//! returns its JSON body. Everything else (retry, normalization, redaction)
//! is layered on top by `ExternalQueryAdapter`, so every source shares one
//! implementation of those concerns.

pub mod fixture;
pub mod http;
pub mod normalize;
pub mod query;
pub mod redact;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use fixture::StaticEvidenceSource;
pub use http::{HttpEvidenceSource, HttpSourceKind};
pub use normalize::{normalize_response, ResponseShape};
pub use query::{ExternalQueryAdapter, QueryError};
pub use redact::Redactor;
pub use retry::RetryPolicy;

/// A request for evidence supporting or contradicting a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Free-text query (normalized by the adapter before use)
    pub query: String,

    /// Maximum number of items wanted
    pub top_k: usize,

    /// Source-specific parameters; may carry secrets and is redacted
    /// before it reaches the ledger
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Failure of a single upstream call
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("could not decode upstream body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl SourceError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(_) | SourceError::Timeout(_) => true,
            SourceError::Status { code, .. } => *code == 429 || (500..600).contains(code),
            SourceError::Decode(_) | SourceError::Invalid(_) => false,
        }
    }
}

/// Trait for external evidence sources
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Perform one request and return the raw JSON body
    async fn fetch(&self, request: &QueryRequest, timeout: Duration) -> Result<Value, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SourceError::Network("reset".into()).is_retryable());
        assert!(SourceError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(SourceError::Status { code: 503, body: String::new() }.is_retryable());
        assert!(SourceError::Status { code: 429, body: String::new() }.is_retryable());
        assert!(!SourceError::Status { code: 401, body: String::new() }.is_retryable());
        assert!(!SourceError::Decode("eof".into()).is_retryable());
        assert!(!SourceError::Invalid("empty".into()).is_retryable());
    }
}
