//! Provenance events and lightweight trace entries.
//!
//! A `ProvenanceEvent` is the validated, hash-verifiable record persisted as
//! one bundle file per event. A `TraceEntry` is the cheap, unvalidated line
//! appended to the trace log for stage transitions and other telemetry.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::provenance::hash::hash_value;

/// Well-known event type tags.
pub mod event_types {
    pub const AUDIT_FLAGGED: &str = "audit_flagged";
    pub const EVIDENCE_EMITTED: &str = "evidence_emitted";
    pub const THREADS_INGESTED: &str = "threads_ingested";
    pub const DOC_GENERATED: &str = "doc_generated";

    pub const RUN_START: &str = "run_start";
    pub const RUN_FINISH: &str = "run_finish";
    pub const STAGE_START: &str = "stage_start";
    pub const STAGE_COMPLETE: &str = "stage_complete";
    pub const STAGE_FAILED: &str = "stage_failed";
}

/// An immutable, hash-verifiable record of a pipeline action.
///
/// Built in memory (pending), then handed to the ledger which validates and
/// persists it. Once persisted it is never rewritten; corrections are new
/// events that reference the old `token` in their payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEvent {
    /// Emitting component
    pub module: String,

    /// Event tag, e.g. `evidence_emitted`
    pub event_type: String,

    /// ISO-8601 UTC emission time
    pub timestamp: String,

    /// Event-specific structured data
    pub payload: Value,

    /// Code version that produced the event, or "unknown"
    pub commit_sha: String,

    /// SHA-256 of the causally preceding input (empty if none)
    pub input_hash: String,

    /// SHA-256 of `payload` under canonical serialization
    pub output_hash: String,

    /// Globally unique id; also the bundle filename key
    pub token: String,
}

impl ProvenanceEvent {
    /// Build a pending event. `output_hash` is always derived from `payload`.
    pub fn new(
        module: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
        commit_sha: impl Into<String>,
        input_hash: Option<&str>,
    ) -> Self {
        let output_hash = hash_value(&payload);
        Self {
            module: module.into(),
            event_type: event_type.into(),
            timestamp: iso_timestamp(Utc::now()),
            payload,
            commit_sha: commit_sha.into(),
            input_hash: input_hash.unwrap_or_default().to_string(),
            output_hash,
            token: Uuid::new_v4().to_string(),
        }
    }

    /// Bundle filename for this event.
    pub fn bundle_file_name(&self) -> String {
        bundle_file_name(&self.token)
    }

    /// Whether `output_hash` still matches the payload.
    pub fn hash_matches(&self) -> bool {
        hash_value(&self.payload) == self.output_hash
    }

    /// Parsed timestamp, if well-formed.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// `<token>-bundle.json`
pub fn bundle_file_name(token: &str) -> String {
    format!("{}-bundle.json", token)
}

/// One line of the append-only trace log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub id: String,
    pub timestamp: String,
    pub agent: String,
    pub event_type: String,
    pub payload: Value,
    pub git_commit: String,
}

impl TraceEntry {
    pub fn new(
        agent: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
        git_commit: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: iso_timestamp(Utc::now()),
            agent: agent.into(),
            event_type: event_type.into(),
            payload,
            git_commit: git_commit.into(),
        }
    }
}

/// RFC 3339 with a `Z` suffix and microsecond precision.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
