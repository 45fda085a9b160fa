//! Evidence items and contradiction candidates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::provenance::hash::snippet_hash;

/// Verification outcome for an evidence item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Title overlap with the claim reached the threshold
    Verified,

    /// Not (yet) verified
    Unverified,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        Self::Unverified
    }
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Unverified => "unverified",
        }
    }
}

/// A normalized unit of externally retrieved information.
///
/// Source adapters fill the descriptive fields; `verification_status` and
/// `match_score` are only ever set by the verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub snippet: String,

    /// Source-provided relevance, unrelated to verification
    #[serde(default)]
    pub score: f64,

    /// sha256(snippet + url)
    #[serde(default)]
    pub snippet_hash: String,

    /// Name of the source that produced the item
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    #[serde(default)]
    pub verification_status: VerificationStatus,

    /// Token-overlap ratio against the originating claim, in [0, 1]
    #[serde(default)]
    pub match_score: f64,
}

impl EvidenceItem {
    /// Build an unverified item; a missing id is derived from the snippet hash.
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        score: f64,
    ) -> Self {
        let url = url.into();
        let snippet = snippet.into();
        let hash = snippet_hash(&snippet, &url);
        let mut id = id.into();
        if id.is_empty() {
            id = hash[..16].to_string();
        }

        Self {
            id,
            url,
            title: title.into(),
            snippet,
            score,
            snippet_hash: hash,
            source: String::new(),
            verification_status: VerificationStatus::Unverified,
            match_score: 0.0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }
}

/// The transient unit submitted for verification.
///
/// Built by candidate discovery from audit records, consumed once by the
/// evidence fetch, and dropped after scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionCandidate {
    pub claim_excerpt: String,
    pub thread_id: String,
    pub subreddit: String,
    pub scoreable_text: String,
}

impl ContradictionCandidate {
    /// Lowercased whitespace tokens of the scoreable text.
    pub fn claim_tokens(&self) -> HashSet<String> {
        tokenize(&self.scoreable_text)
    }
}

/// Lowercase, split on whitespace, deduplicate.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_is_unverified_with_hash() {
        let item = EvidenceItem::new("", "https://example.org", "Title", "Snippet", 1.5);
        assert_eq!(item.verification_status, VerificationStatus::Unverified);
        assert_eq!(item.match_score, 0.0);
        assert_eq!(item.snippet_hash.len(), 64);
        assert_eq!(item.id, item.snippet_hash[..16]);
    }

    #[test]
    fn test_item_deserializes_with_missing_fields() {
        let item: EvidenceItem = serde_json::from_str(r#"{"verification_status":"unverified"}"#).unwrap();
        assert_eq!(item.title, "");
        assert_eq!(item.match_score, 0.0);
        assert!(!item.is_verified());
    }

    #[test]
    fn test_claim_tokens_lowercased() {
        let candidate = ContradictionCandidate {
            claim_excerpt: "Quantum Physics".to_string(),
            thread_id: "t1".to_string(),
            subreddit: "r/science".to_string(),
            scoreable_text: "Quantum  Physics quantum".to_string(),
        };
        let tokens = candidate.claim_tokens();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains("quantum"));
        assert!(tokens.contains("physics"));
    }
}
