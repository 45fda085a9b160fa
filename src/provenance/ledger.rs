//! Append-only provenance ledger.
//!
//! Two stores live side by side:
//! - the bundle directory, one validated `<token>-bundle.json` per event,
//!   created by atomic rename and never rewritten;
//! - the trace log, JSON lines appended under a file lock, for cheap
//!   unvalidated telemetry such as stage transitions.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::events::bundle_file_name;
use crate::domain::{ProvenanceEvent, TraceEntry};
use crate::storage::{self, WriteMode};

use super::schema::{validate_event, SchemaValidationError};

const BUNDLE_SUFFIX: &str = "-bundle.json";

/// Errors raised by the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read-only selection over persisted events
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub module: Option<String>,
    pub event_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub token: Option<String>,
}

impl EventFilter {
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn matches(&self, event: &ProvenanceEvent) -> bool {
        if let Some(ref module) = self.module {
            if &event.module != module {
                return false;
            }
        }
        if let Some(ref event_type) = self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(ref token) = self.token {
            if &event.token != token {
                return false;
            }
        }
        if let Some(since) = self.since {
            match event.timestamp_utc() {
                Some(ts) if ts >= since => {}
                _ => return false,
            }
        }
        true
    }
}

/// Aggregate counts over the bundle directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_events: usize,
    pub by_module: BTreeMap<String, usize>,
    pub by_event_type: BTreeMap<String, usize>,
    /// Keyed by UTC date (YYYY-MM-DD)
    pub by_date: BTreeMap<String, usize>,
    pub unreadable: usize,
}

/// Result of re-hashing every persisted bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub checked: usize,
    /// (file name, problem)
    pub problems: Vec<(String, String)>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// File-based provenance ledger
#[derive(Debug, Clone)]
pub struct ProvenanceLedger {
    /// Directory holding `<token>-bundle.json` files
    bundle_dir: PathBuf,

    /// JSON-lines trace log
    trace_path: PathBuf,

    /// Code version stamped on every event
    commit_sha: String,
}

impl ProvenanceLedger {
    /// Open (creating if needed) a ledger rooted at explicit paths.
    pub fn open(
        bundle_dir: impl Into<PathBuf>,
        trace_path: impl Into<PathBuf>,
        commit_sha: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        let bundle_dir = bundle_dir.into();
        fs::create_dir_all(&bundle_dir)?;

        Ok(Self {
            bundle_dir,
            trace_path: trace_path.into(),
            commit_sha: commit_sha.into(),
        })
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub fn trace_path(&self) -> &Path {
        &self.trace_path
    }

    pub fn commit_sha(&self) -> &str {
        &self.commit_sha
    }

    /// Build, validate and durably persist one event.
    ///
    /// Schema failures are returned before anything touches disk.
    pub fn emit(
        &self,
        module: &str,
        event_type: &str,
        payload: Value,
        input_hash: Option<&str>,
    ) -> Result<ProvenanceEvent, LedgerError> {
        let event = ProvenanceEvent::new(module, event_type, payload, &self.commit_sha, input_hash);
        self.persist(&event)?;
        Ok(event)
    }

    /// Validate and persist an already-built event.
    pub fn persist(&self, event: &ProvenanceEvent) -> Result<PathBuf, LedgerError> {
        let value = serde_json::to_value(event)?;
        validate_event(&value)?;

        let path = self.bundle_dir.join(event.bundle_file_name());
        storage::write_json_atomic(&path, &value, WriteMode::CreateNew).map_err(|source| {
            LedgerError::Persist {
                path: path.clone(),
                source,
            }
        })?;

        debug!(
            token = %event.token,
            module = %event.module,
            event_type = %event.event_type,
            "Provenance event persisted"
        );
        Ok(path)
    }

    /// Append one trace entry (not schema-validated).
    pub fn append_log(&self, entry: &TraceEntry) -> Result<(), LedgerError> {
        let line = serde_json::to_string(entry)?;
        storage::append_line(&self.trace_path, &line)?;
        Ok(())
    }

    /// Convenience wrapper that stamps the ledger's commit sha.
    pub fn trace(&self, agent: &str, event_type: &str, payload: Value) -> Result<TraceEntry, LedgerError> {
        let entry = TraceEntry::new(agent, event_type, payload, &self.commit_sha);
        self.append_log(&entry)?;
        Ok(entry)
    }

    /// Replay the trace log in append order.
    pub fn read_trace(&self) -> Result<Vec<TraceEntry>, LedgerError> {
        if !self.trace_path.exists() {
            return Ok(Vec::new());
        }
        let (entries, _) = storage::read_ndjson(&self.trace_path)?;
        Ok(entries)
    }

    /// Scan persisted events matching `filter`, oldest first.
    pub fn query(&self, filter: &EventFilter) -> Result<Vec<ProvenanceEvent>, LedgerError> {
        let mut events: Vec<ProvenanceEvent> = self
            .load_all()?
            .into_iter()
            .filter_map(|(_, loaded)| loaded.ok())
            .filter(|event| filter.matches(event))
            .collect();

        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.token.cmp(&b.token))
        });
        Ok(events)
    }

    /// Counts by module, event type and date.
    pub fn statistics(&self) -> Result<LedgerStats, LedgerError> {
        let mut stats = LedgerStats::default();

        for (_, loaded) in self.load_all()? {
            let event = match loaded {
                Ok(event) => event,
                Err(_) => {
                    stats.unreadable += 1;
                    continue;
                }
            };

            stats.total_events += 1;
            *stats.by_module.entry(event.module.clone()).or_default() += 1;
            *stats.by_event_type.entry(event.event_type.clone()).or_default() += 1;
            let date = event.timestamp.get(..10).unwrap_or("unknown").to_string();
            *stats.by_date.entry(date).or_default() += 1;
        }

        Ok(stats)
    }

    /// Re-hash every bundle's payload and check it against `output_hash`.
    pub fn verify_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let mut report = IntegrityReport::default();

        for (file_name, loaded) in self.load_all()? {
            report.checked += 1;
            let event = match loaded {
                Ok(event) => event,
                Err(problem) => {
                    report.problems.push((file_name, problem));
                    continue;
                }
            };

            if !event.hash_matches() {
                report
                    .problems
                    .push((file_name.clone(), "output_hash does not match payload".to_string()));
            }
            if file_name != bundle_file_name(&event.token) {
                report
                    .problems
                    .push((file_name, format!("file name does not match token {}", event.token)));
            }
        }

        Ok(report)
    }

    /// Load every bundle file, keeping per-file parse problems.
    fn load_all(&self) -> Result<Vec<(String, Result<ProvenanceEvent, String>)>, LedgerError> {
        if !self.bundle_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.bundle_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(BUNDLE_SUFFIX) && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();

        let mut loaded = Vec::with_capacity(names.len());
        for name in names {
            let path = self.bundle_dir.join(&name);
            let result = storage::read_json::<Value>(&path)
                .map_err(|e| e.to_string())
                .and_then(|value| {
                    validate_event(&value).map_err(|e| e.to_string())?;
                    serde_json::from_value::<ProvenanceEvent>(value).map_err(|e| e.to_string())
                });
            if let Err(ref problem) = result {
                warn!(file = %name, %problem, "Unreadable provenance bundle");
            }
            loaded.push((name, result));
        }

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_ledger() -> (ProvenanceLedger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = ProvenanceLedger::open(
            temp_dir.path().join("provenance"),
            temp_dir.path().join("trace.jsonl"),
            "deadbeef",
        )
        .unwrap();
        (ledger, temp_dir)
    }

    #[test]
    fn test_emit_writes_bundle() {
        let (ledger, _temp) = create_test_ledger();

        let event = ledger
            .emit("test_module", "evidence_emitted", json!({"foo": "bar"}), Some("abc123"))
            .unwrap();

        let path = ledger.bundle_dir().join(format!("{}-bundle.json", event.token));
        assert!(path.exists());

        let stored: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored["module"], "test_module");
        assert_eq!(stored["commit_sha"], "deadbeef");
        assert_eq!(stored["input_hash"], "abc123");
        assert_eq!(stored["payload"], json!({"foo": "bar"}));
        assert_eq!(stored.as_object().unwrap().len(), 8);
    }

    #[test]
    fn test_same_payload_same_output_hash() {
        let (ledger, _temp) = create_test_ledger();

        let a = ledger.emit("m", "t", json!({"a": 1, "b": [1, 2]}), None).unwrap();
        let b = ledger.emit("m", "t", json!({"b": [1, 2], "a": 1}), None).unwrap();

        assert_ne!(a.token, b.token);
        assert_eq!(a.output_hash, b.output_hash);
    }

    #[test]
    fn test_schema_failure_writes_nothing() {
        let (ledger, _temp) = create_test_ledger();

        let err = ledger.emit("m", "t", json!(["not", "an", "object"]), None).unwrap_err();
        assert!(matches!(err, LedgerError::Schema(_)));

        let err = ledger.emit("", "t", json!({}), None).unwrap_err();
        assert!(matches!(err, LedgerError::Schema(_)));

        assert_eq!(fs::read_dir(ledger.bundle_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_persisted_event_never_overwritten() {
        let (ledger, _temp) = create_test_ledger();

        let event = ledger.emit("m", "t", json!({"v": 1}), None).unwrap();
        let mut forged = event.clone();
        forged.payload = json!({"v": 2});

        let err = ledger.persist(&forged).unwrap_err();
        assert!(matches!(err, LedgerError::Persist { .. }));
        let stored = ledger.query(&EventFilter::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payload, json!({"v": 1}));
    }

    #[test]
    fn test_query_filters() {
        let (ledger, _temp) = create_test_ledger();

        ledger.emit("audit", "audit_flagged", json!({"n": 1}), None).unwrap();
        ledger.emit("audit", "audit_flagged", json!({"n": 2}), None).unwrap();
        ledger.emit("expand_contradict", "evidence_emitted", json!({"n": 3}), None).unwrap();

        assert_eq!(ledger.query(&EventFilter::default()).unwrap().len(), 3);
        assert_eq!(ledger.query(&EventFilter::default().module("audit")).unwrap().len(), 2);
        assert_eq!(
            ledger
                .query(&EventFilter::default().event_type("evidence_emitted"))
                .unwrap()
                .len(),
            1
        );

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(ledger.query(&EventFilter::default().since(future)).unwrap().is_empty());
    }

    #[test]
    fn test_trace_log_round_trip() {
        let (ledger, _temp) = create_test_ledger();

        ledger.trace("pipeline", "stage_start", json!({"stage": "audit"})).unwrap();
        ledger.trace("pipeline", "stage_complete", json!({"stage": "audit", "records": 3})).unwrap();

        let entries = ledger.read_trace().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event_type, "stage_start");
        assert_eq!(entries[1].payload["records"], 3);
        assert_eq!(entries[1].git_commit, "deadbeef");

        // Trace entries are not bundles
        assert!(ledger.query(&EventFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_statistics() {
        let (ledger, _temp) = create_test_ledger();

        ledger.emit("audit", "audit_flagged", json!({}), None).unwrap();
        ledger.emit("audit", "audit_flagged", json!({}), None).unwrap();
        ledger.emit("doc", "doc_generated", json!({}), None).unwrap();
        fs::write(ledger.bundle_dir().join("broken-bundle.json"), "{").unwrap();

        let stats = ledger.statistics().unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.by_module.get("audit"), Some(&2));
        assert_eq!(stats.by_event_type.get("doc_generated"), Some(&1));
        assert_eq!(stats.by_date.values().sum::<usize>(), 3);
        assert_eq!(stats.unreadable, 1);
    }

    #[test]
    fn test_verify_integrity_detects_tampering() {
        let (ledger, _temp) = create_test_ledger();

        let event = ledger.emit("m", "t", json!({"score": 0.5}), None).unwrap();
        ledger.emit("m", "t", json!({"score": 0.7}), None).unwrap();
        assert!(ledger.verify_integrity().unwrap().is_clean());

        let path = ledger.bundle_dir().join(event.bundle_file_name());
        let mut value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        value["payload"]["score"] = json!(0.99);
        fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

        let report = ledger.verify_integrity().unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].0, event.bundle_file_name());
    }

    #[test]
    fn test_concurrent_emitters() {
        let (ledger, _temp) = create_test_ledger();

        std::thread::scope(|s| {
            for worker in 0..4 {
                let ledger = &ledger;
                s.spawn(move || {
                    for i in 0..10 {
                        ledger.emit("worker", "t", json!({"w": worker, "i": i}), None).unwrap();
                        ledger.trace("worker", "tick", json!({"w": worker, "i": i})).unwrap();
                    }
                });
            }
        });

        assert_eq!(ledger.query(&EventFilter::default()).unwrap().len(), 40);
        assert_eq!(ledger.read_trace().unwrap().len(), 40);
    }
}
