//! Domain types for the audit pipeline.
//!
//! This module contains the core data structures:
//! - Events: provenance bundles and trace entries
//! - Evidence: normalized evidence items and contradiction candidates
//! - Audit: thread and audit records exchanged between stages
//! - Run: stage selection and run reports

pub mod audit;
pub mod events;
pub mod evidence;
pub mod run;

// Re-export commonly used types
pub use audit::{AuditRecord, ThreadRecord};
pub use events::{event_types, ProvenanceEvent, TraceEntry};
pub use evidence::{tokenize, ContradictionCandidate, EvidenceItem, VerificationStatus};
pub use run::{RunReport, Stage, StageReport, StageSelection};
