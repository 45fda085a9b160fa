//! The uniform query contract over any `EvidenceSource`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::domain::EvidenceItem;

use super::normalize::normalize_response;
use super::redact::Redactor;
use super::retry::RetryPolicy;
use super::{EvidenceSource, QueryRequest, SourceError};

/// Longest query sent upstream, in chars
pub const MAX_QUERY_CHARS: usize = 512;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced by `ExternalQueryAdapter::query`
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Transient failures persisted through the whole attempt budget
    #[error("{source_name} unavailable after {attempts} attempts: {last_error}")]
    UpstreamUnavailable {
        source_name: String,
        attempts: u32,
        last_error: SourceError,
    },

    /// The body matched no known response shape
    #[error("{source_name} returned a malformed response: {reason}")]
    MalformedResponse { source_name: String, reason: String },

    /// Non-retryable failure (bad request, auth, empty query)
    #[error("{source_name} rejected the request: {error}")]
    Rejected {
        source_name: String,
        error: SourceError,
    },
}

/// Retry, timeout, normalization and redaction around one source
#[derive(Clone)]
pub struct ExternalQueryAdapter {
    source: Arc<dyn EvidenceSource>,
    policy: RetryPolicy,
    timeout: Duration,
    redactor: Redactor,
}

impl std::fmt::Debug for ExternalQueryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalQueryAdapter")
            .field("source", &self.source.name())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ExternalQueryAdapter {
    pub fn new(source: Arc<dyn EvidenceSource>) -> Self {
        Self {
            source,
            policy: RetryPolicy::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            redactor: Redactor::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch and normalize evidence for `request`.
    ///
    /// Retryable source errors are retried per the policy; anything else
    /// fails on the first attempt. Returned items are always unverified.
    #[instrument(skip(self, request), fields(source = %self.source.name()))]
    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<EvidenceItem>, QueryError> {
        let source_name = self.source.name().to_string();
        let normalized = self.normalized_request(request).map_err(|error| QueryError::Rejected {
            source_name: source_name.clone(),
            error,
        })?;

        let timeout = self.timeout;
        let outcome = self
            .policy
            .run(
                &source_name,
                |attempt| {
                    debug!(attempt, "Querying evidence source");
                    let fetch = self.source.fetch(&normalized, timeout);
                    async move {
                        match tokio::time::timeout(timeout, fetch).await {
                            Ok(result) => result,
                            Err(_) => Err(SourceError::Timeout(timeout)),
                        }
                    }
                },
                SourceError::is_retryable,
            )
            .await;

        let body = match outcome {
            Ok(body) => body,
            Err(exhausted) => {
                return Err(match exhausted.last_error {
                    SourceError::Decode(reason) => QueryError::MalformedResponse { source_name, reason },
                    error if exhausted.retryable => QueryError::UpstreamUnavailable {
                        source_name,
                        attempts: exhausted.attempts,
                        last_error: error,
                    },
                    error => QueryError::Rejected { source_name, error },
                })
            }
        };

        let items = normalize_response(body, &source_name, normalized.top_k).map_err(|reason| {
            warn!(source = %source_name, %reason, "Malformed evidence response");
            QueryError::MalformedResponse {
                source_name: source_name.clone(),
                reason,
            }
        })?;

        debug!(items = items.len(), "Evidence normalized");
        Ok(items)
    }

    /// Redacted description of `request`, safe to embed in a ledger payload.
    pub fn describe(&self, request: &QueryRequest) -> Value {
        let described = json!({
            "source": self.source.name(),
            "query": normalize_query(&request.query),
            "top_k": request.top_k,
            "params": request.params,
        });
        self.redactor.redact(&described)
    }

    /// Error text for the ledger, with secret request params masked.
    pub fn describe_error(&self, request: &QueryRequest, error: &QueryError) -> String {
        self.redactor.scrub_text(&error.to_string(), &request.params)
    }

    fn normalized_request(&self, request: &QueryRequest) -> Result<QueryRequest, SourceError> {
        let query = normalize_query(&request.query);
        if query.is_empty() {
            return Err(SourceError::Invalid("empty query".to_string()));
        }
        Ok(QueryRequest {
            query,
            top_k: request.top_k.max(1),
            params: request.params.clone(),
        })
    }
}

/// Trim, collapse whitespace runs, and cap at `MAX_QUERY_CHARS`.
pub fn normalize_query(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_QUERY_CHARS) {
        Some((cut, _)) => collapsed[..cut].trim_end().to_string(),
        None => collapsed,
    }
}
