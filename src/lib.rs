//! jules - provenance-tracked audit of suspected LLM-generated threads
//!
//! Threads are classified by heuristic flags, flagged claims are checked
//! against external evidence sources, and every step is recorded in a
//! tamper-evident provenance ledger.
//!
//! # Architecture
//!
//! The system is built around an append-only ledger:
//! - Every pipeline action emits an immutable, hash-verifiable event
//! - Stages communicate only through files, so any stage can be re-run
//! - Stage transitions are traced in a separate JSON-lines log
//!
//! # Modules
//!
//! - `provenance`: canonical hashing, bundle schema, ledger
//! - `adapters`: evidence sources, retry, normalization, redaction
//! - `evidence`: verification and contradiction scoring
//! - `audit`: heuristic classifier
//! - `core`: pipeline orchestration and stages
//! - `domain`: data structures (events, evidence, audit records, runs)
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run every stage against an offline fixture
//! jules run --mock fixtures/evidence.json
//!
//! # Re-run a single stage
//! jules run --stage expand_contradict
//!
//! # Inspect the ledger
//! jules query --module expand_contradict
//! jules verify
//! ```

pub mod adapters;
pub mod audit;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod evidence;
pub mod provenance;
pub mod storage;

// Re-export main types at crate root for convenience
pub use adapters::{EvidenceSource, ExternalQueryAdapter, QueryError, QueryRequest, RetryPolicy};
pub use core::AuditPipeline;
pub use domain::{AuditRecord, EvidenceItem, ProvenanceEvent, RunReport, Stage, StageSelection};
pub use evidence::{ContradictionScorer, EvidenceVerifier};
pub use provenance::{EventFilter, LedgerError, ProvenanceLedger, SchemaValidationError};
