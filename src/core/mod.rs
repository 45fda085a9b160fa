//! Core orchestration logic.
//!
//! This module contains:
//! - AuditPipeline: stage sequencing and run reporting
//! - Stages: ingest, audit, expand_contradict, doc
//! - DataLayout: where each stage reads and writes
//! - IngestLimits: input file safety checks

pub mod layout;
pub mod orchestrator;
pub mod safety;
mod stages;

// Re-export commonly used types
pub use layout::DataLayout;
pub use orchestrator::{AuditPipeline, PipelineSettings, TRACE_AGENT};
pub use safety::{IngestLimits, SafetyViolation};
