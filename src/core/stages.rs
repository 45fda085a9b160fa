//! The four pipeline stages.
//!
//! Stages only talk to each other through files in the data layout, so any
//! stage can be re-run on its own. Every stage overwrites its own outputs
//! atomically; provenance bundles are only ever added.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapters::{QueryError, QueryRequest};
use crate::audit::flags;
use crate::domain::event_types;
use crate::domain::{AuditRecord, EvidenceItem, Stage, StageReport, ThreadRecord};
use crate::provenance::hash::{hash_payload, hash_value, sha256_hex};
use crate::storage::{self, WriteMode};

use super::layout::{file_stem_for, stem_of};
use super::orchestrator::AuditPipeline;

impl AuditPipeline {
    /// Normalize collaborator NDJSON into per-subreddit thread files.
    ///
    /// Records are merged with any previously ingested threads for the same
    /// subreddit and deduplicated by id, so re-ingesting a file is a no-op.
    pub(super) fn ingest(&self, inputs: &[PathBuf]) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Ingest);
        let files = if inputs.is_empty() {
            self.layout.inbox_files().context("Failed to list inbox")?
        } else {
            inputs.to_vec()
        };

        if files.is_empty() {
            info!(inbox = %self.layout.inbox.display(), "No input files to ingest");
            return Ok(report);
        }

        let limits = &self.settings.ingest;
        let mut by_subreddit: BTreeMap<String, Vec<ThreadRecord>> = BTreeMap::new();
        let mut input_summaries = Vec::new();
        let mut skipped_lines = 0;

        for file in &files {
            if let Err(violation) = limits.check_file(file) {
                warn!(file = %file.display(), %violation, "Rejected input file");
                report.failures += 1;
                continue;
            }

            let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
            let (threads, skipped) = storage::read_ndjson::<ThreadRecord>(file)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            if let Err(violation) = limits.check_records(threads.len()) {
                warn!(file = %file.display(), %violation, "Rejected input file");
                report.failures += 1;
                continue;
            }

            if skipped > 0 {
                warn!(file = %file.display(), skipped, "Unparseable thread lines dropped");
            }
            report.records_in += threads.len();
            report.failures += skipped;
            skipped_lines += skipped;
            input_summaries.push(json!({
                "path": file.display().to_string(),
                "sha256": sha256_hex(&bytes),
                "records": threads.len(),
                "skipped_lines": skipped,
            }));

            for thread in threads {
                let stem = file_stem_for(&thread.subreddit);
                by_subreddit.entry(stem).or_default().push(thread);
            }
        }

        let mut written = BTreeMap::new();
        let mut duplicates = 0;
        for (stem, incoming) in by_subreddit {
            let path = self.layout.threads_file(&stem);
            let mut merged: Vec<ThreadRecord> = if path.exists() {
                storage::read_ndjson::<ThreadRecord>(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?
                    .0
            } else {
                Vec::new()
            };
            let existing = merged.len();

            let mut seen: HashSet<String> = merged.iter().map(|t| t.id.clone()).collect();
            for thread in incoming {
                if thread.id.is_empty() || !seen.insert(thread.id.clone()) {
                    duplicates += 1;
                    continue;
                }
                merged.push(thread);
            }

            let mut body = String::new();
            for thread in &merged {
                body.push_str(&serde_json::to_string(thread)?);
                body.push('\n');
            }
            storage::write_atomic(&path, body.as_bytes(), WriteMode::Replace)
                .with_context(|| format!("Failed to write {}", path.display()))?;

            debug!(subreddit = %stem, new = merged.len() - existing, total = merged.len(), "Threads written");
            report.records_out += merged.len() - existing;
            report.outputs.push(path.display().to_string());
            written.insert(stem, merged.len());
        }

        if !input_summaries.is_empty() {
            let inputs_value = Value::Array(input_summaries);
            self.ledger.emit(
                Stage::Ingest.as_str(),
                event_types::THREADS_INGESTED,
                json!({
                    "inputs": inputs_value,
                    "subreddits": written,
                    "new_records": report.records_out,
                    "duplicates": duplicates,
                    "skipped_lines": skipped_lines,
                }),
                Some(&hash_value(&inputs_value)),
            )?;
        }

        Ok(report)
    }

    /// Classify every ingested thread into an audit record.
    ///
    /// Output is a pure function of the thread file apart from
    /// `provenance_id`, which points at the `audit_flagged` bundle emitted
    /// for flagged records.
    pub(super) fn audit(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Audit);

        for file in self.layout.thread_files()? {
            let Some(stem) = stem_of(&file) else { continue };
            let (threads, _) = storage::read_ndjson::<ThreadRecord>(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            report.records_in += threads.len();

            let mut records = Vec::with_capacity(threads.len());
            for thread in threads {
                let mut record = self.classify(thread);
                if record.flags.iter().any(|f| f != flags::NO_FLAG) {
                    let event = self.ledger.emit(
                        Stage::Audit.as_str(),
                        event_types::AUDIT_FLAGGED,
                        json!({
                            "thread_id": record.thread_id,
                            "subreddit": record.subreddit,
                            "flags": record.flags,
                            "confidence": record.confidence,
                            "input_sha256": record.input_sha256,
                        }),
                        Some(&record.input_sha256),
                    )?;
                    record.provenance_id = Some(event.token);
                }
                records.push(record);
            }

            let path = self.layout.audit_file(&stem);
            storage::write_json_atomic(&path, &records, WriteMode::Replace)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            report.records_out += records.len();
            report.outputs.push(path.display().to_string());
        }

        Ok(report)
    }

    fn classify(&self, thread: ThreadRecord) -> AuditRecord {
        let text = thread.combined_text();
        let verdict = self.classifier.classify(&text);

        AuditRecord {
            thread_id: thread.id,
            subreddit: thread.subreddit,
            title: thread.title,
            selftext: thread.selftext,
            created_utc: thread.created_utc,
            flags: verdict.flags,
            confidence: verdict.confidence,
            evidence: verdict.evidence,
            input_sha256: sha256_hex(text.as_bytes()),
            provenance_id: None,
            contradiction_hits: None,
            contradiction_score: None,
            extra: thread
                .extra
                .into_iter()
                .filter(|(key, _)| !AuditRecord::FIELDS.contains(&key.as_str()))
                .collect(),
        }
    }

    /// Fetch, verify and score evidence for every candidate record.
    ///
    /// One `evidence_emitted` bundle is written per candidate. A candidate
    /// whose sources are unavailable is counted as a failure and the stage
    /// moves on; a malformed response only means zero evidence.
    pub(super) async fn expand_contradict(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::ExpandContradict);
        let wanted = &self.settings.pipeline.candidate_flags;
        let audit_files = self.layout.audit_files()?;

        if self.adapters.is_empty() && !audit_files.is_empty() {
            bail!("no evidence sources configured");
        }

        for file in audit_files {
            let Some(stem) = stem_of(&file) else { continue };
            let mut records: Vec<AuditRecord> = storage::read_json(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            report.records_in += records.len();

            for record in records.iter_mut().filter(|r| r.has_any_flag(wanted)) {
                if !self.expand_record(record).await? {
                    report.failures += 1;
                }
                report.records_out += 1;
            }

            let path = self.layout.contradictions_file(&stem);
            storage::write_json_atomic(&path, &records, WriteMode::Replace)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            report.outputs.push(path.display().to_string());
        }

        Ok(report)
    }

    /// Attach evidence to one record and emit its bundle. Returns false when
    /// any source was unavailable or rejected the request.
    async fn expand_record(&self, record: &mut AuditRecord) -> Result<bool> {
        let candidate = record.to_candidate();
        let claim_tokens = candidate.claim_tokens();
        let query_text = if candidate.scoreable_text.trim().is_empty() {
            &candidate.claim_excerpt
        } else {
            &candidate.scoreable_text
        };
        let request = QueryRequest::new(query_text.clone(), self.settings.pipeline.top_k);

        let mut hits: Vec<EvidenceItem> = Vec::new();
        let mut seen = HashSet::new();
        let mut errors = Vec::new();
        let mut requests = Vec::new();
        let mut ok = true;

        for adapter in &self.adapters {
            requests.push(adapter.describe(&request));
            match adapter.query(&request).await {
                Ok(items) => {
                    for item in self.verifier.verify_all(items, &claim_tokens) {
                        if seen.insert(dedup_key(&item)) {
                            hits.push(item);
                        }
                    }
                }
                Err(e) => {
                    let message = adapter.describe_error(&request, &e);
                    if matches!(e, QueryError::MalformedResponse { .. }) {
                        warn!(thread_id = %candidate.thread_id, error = %message, "Treating malformed response as no evidence");
                    } else {
                        warn!(thread_id = %candidate.thread_id, error = %message, "Evidence fetch failed");
                        ok = false;
                    }
                    errors.push(json!({"source": adapter.source_name(), "kind": query_error_kind(&e), "error": message}));
                }
            }
        }

        let score = self.scorer.score(&hits);
        let verified = hits.iter().filter(|h| h.is_verified()).count();
        debug!(thread_id = %candidate.thread_id, hits = hits.len(), verified, score, "Candidate scored");

        self.ledger.emit(
            Stage::ExpandContradict.as_str(),
            event_types::EVIDENCE_EMITTED,
            json!({
                "thread_id": candidate.thread_id,
                "subreddit": candidate.subreddit,
                "claim_excerpt": candidate.claim_excerpt,
                "requests": requests,
                "evidence": hits,
                "contradiction_score": score,
                "errors": errors,
            }),
            Some(&hash_payload(&candidate)?),
        )?;

        record.attach_contradictions(hits, score);
        Ok(ok)
    }

    /// Render the top-scored records into the contradiction report.
    pub(super) fn doc(&self) -> Result<StageReport> {
        let mut report = StageReport::new(Stage::Doc);
        let mut scored: Vec<AuditRecord> = Vec::new();

        for file in self.layout.contradiction_files()? {
            let records: Vec<AuditRecord> = storage::read_json(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            report.records_in += records.len();
            scored.extend(records.into_iter().filter(|r| r.contradiction_score.is_some()));
        }

        scored.sort_by(|a, b| {
            let (sa, sb) = (a.contradiction_score.unwrap_or(0.0), b.contradiction_score.unwrap_or(0.0));
            sb.total_cmp(&sa).then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        let considered = scored.len();
        scored.truncate(self.settings.pipeline.doc_top_n);

        let markdown = render_report(&scored, considered);
        let path = self.layout.report_file();
        storage::write_atomic(&path, markdown.as_bytes(), WriteMode::Replace)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        self.ledger.emit(
            Stage::Doc.as_str(),
            event_types::DOC_GENERATED,
            json!({
                "path": path.display().to_string(),
                "records_considered": considered,
                "records_listed": scored.len(),
                "thread_ids": scored.iter().map(|r| r.thread_id.as_str()).collect::<Vec<_>>(),
                "output_sha256": sha256_hex(markdown.as_bytes()),
            }),
            None,
        )?;

        report.records_out = scored.len();
        report.outputs.push(path.display().to_string());
        Ok(report)
    }
}

fn query_error_kind(error: &QueryError) -> &'static str {
    match error {
        QueryError::UpstreamUnavailable { .. } => "upstream_unavailable",
        QueryError::MalformedResponse { .. } => "malformed_response",
        QueryError::Rejected { .. } => "rejected",
    }
}

fn render_report(records: &[AuditRecord], considered: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Contradictions\n");
    let _ = writeln!(
        out,
        "Top {} of {} scored thread(s), highest contradiction score first.\n",
        records.len(),
        considered
    );

    if records.is_empty() {
        let _ = writeln!(out, "_No scored threads._");
        return out;
    }

    let _ = writeln!(out, "| # | Subreddit | Thread | Title | Flags | Score | Verified | Top evidence |");
    let _ = writeln!(out, "|---|-----------|--------|-------|-------|-------|----------|--------------|");
    for (idx, record) in records.iter().enumerate() {
        let hits = record.contradiction_hits.as_deref().unwrap_or(&[]);
        let verified = hits.iter().filter(|h| h.is_verified()).count();
        let top = hits
            .iter()
            .filter(|h| h.is_verified())
            .chain(hits.iter().filter(|h| !h.is_verified()))
            .next()
            .map(evidence_link)
            .unwrap_or_default();

        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {:.2} | {}/{} | {} |",
            idx + 1,
            escape_cell(&record.subreddit),
            escape_cell(&record.thread_id),
            escape_cell(&record.title),
            record.flags.join(", "),
            record.contradiction_score.unwrap_or(0.0),
            verified,
            hits.len(),
            top
        );
    }
    out
}

/// Items without snippet or url all share one snippet hash; key those by title.
fn dedup_key(item: &EvidenceItem) -> String {
    if item.snippet.is_empty() && item.url.is_empty() {
        format!("title:{}", item.title)
    } else {
        item.snippet_hash.clone()
    }
}

fn evidence_link(item: &EvidenceItem) -> String {
    let label = if item.title.is_empty() { &item.id } else { &item.title };
    if item.url.is_empty() {
        escape_cell(label)
    } else {
        format!("[{}]({})", escape_cell(label), item.url.replace(' ', "%20"))
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VerificationStatus;

    fn scored_record(id: &str, score: f64, hits: Vec<EvidenceItem>) -> AuditRecord {
        AuditRecord {
            thread_id: id.to_string(),
            subreddit: "science".to_string(),
            title: format!("Title | {}", id),
            selftext: String::new(),
            created_utc: None,
            flags: vec!["GPT_style".to_string()],
            confidence: 0.65,
            evidence: Vec::new(),
            input_sha256: String::new(),
            provenance_id: None,
            contradiction_hits: Some(hits),
            contradiction_score: Some(score),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_render_report_table() {
        let mut hit = EvidenceItem::new("e1", "https://example.org/a", "Quantum physics", "A theory.", 0.0);
        hit.verification_status = VerificationStatus::Verified;
        hit.match_score = 1.0;

        let markdown = render_report(&[scored_record("t1", 0.8, vec![hit])], 3);
        assert!(markdown.starts_with("# Contradictions"));
        assert!(markdown.contains("Top 1 of 3"));
        assert!(markdown.contains("Title \\| t1"));
        assert!(markdown.contains("| 0.80 | 1/1 | [Quantum physics](https://example.org/a) |"));
    }

    #[test]
    fn test_title_only_items_keyed_by_title() {
        let a = EvidenceItem::new("", "", "Quantum physics", "", 0.0);
        let b = EvidenceItem::new("", "", "Classical mechanics", "", 0.0);
        assert_eq!(a.snippet_hash, b.snippet_hash);
        assert_ne!(dedup_key(&a), dedup_key(&b));

        let c = EvidenceItem::new("", "https://example.org/a", "Quantum physics", "", 0.0);
        assert_eq!(dedup_key(&c), c.snippet_hash);
    }

    #[test]
    fn test_render_empty_report() {
        assert!(render_report(&[], 0).contains("_No scored threads._"));
    }
}
