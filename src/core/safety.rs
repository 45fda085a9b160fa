//! Ingest safety limits.
//!
//! Input files are checked before they are read:
//! - Denylist patterns (to avoid ingesting secrets)
//! - File size
//! - Record count per file

use std::fs;
use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limits applied to ingest input files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestLimits {
    /// Maximum input file size in bytes (default: 50MB)
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,

    /// Maximum thread records accepted from one file (default: 100k)
    #[serde(default = "default_max_records")]
    pub max_records_per_file: usize,

    /// Glob patterns to reject (files matching these won't be read)
    #[serde(default = "default_denylist")]
    pub denylist_patterns: Vec<String>,
}

fn default_max_input_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_max_records() -> usize {
    100_000
}

fn default_denylist() -> Vec<String> {
    vec![
        "**/.env*".to_string(),
        "**/*secret*".to_string(),
        "**/*credential*".to_string(),
        "**/*.pem".to_string(),
        "**/*.key".to_string(),
    ]
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            max_records_per_file: default_max_records(),
            denylist_patterns: default_denylist(),
        }
    }
}

impl IngestLimits {
    /// Check if a path matches any denylist pattern
    pub fn is_denylisted(&self, path: &str) -> bool {
        self.denylist_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|pattern| pattern.matches(path))
    }

    /// Validate a file against the denylist and size limit without reading it
    pub fn check_file(&self, path: &Path) -> Result<(), SafetyViolation> {
        let path_str = path.to_string_lossy();
        if self.is_denylisted(&path_str) {
            return Err(SafetyViolation::DenylistMatch {
                path: path_str.to_string(),
            });
        }

        let size = fs::metadata(path)
            .map_err(|e| SafetyViolation::Unreadable {
                path: path_str.to_string(),
                reason: e.to_string(),
            })?
            .len();
        if size > self.max_input_bytes {
            return Err(SafetyViolation::MaxInputBytes {
                actual: size,
                limit: self.max_input_bytes,
            });
        }

        Ok(())
    }

    /// Validate the number of records parsed from one file
    pub fn check_records(&self, count: usize) -> Result<(), SafetyViolation> {
        if count > self.max_records_per_file {
            return Err(SafetyViolation::MaxRecords {
                actual: count,
                limit: self.max_records_per_file,
            });
        }
        Ok(())
    }
}

/// Safety violation errors
#[derive(Debug, Clone, Error)]
pub enum SafetyViolation {
    #[error("Maximum input bytes exceeded: {actual} > {limit}")]
    MaxInputBytes { actual: u64, limit: u64 },

    #[error("Maximum records per file exceeded: {actual} > {limit}")]
    MaxRecords { actual: usize, limit: usize },

    #[error("Path matches denylist pattern: {path}")]
    DenylistMatch { path: String },

    #[error("Cannot stat input {path}: {reason}")]
    Unreadable { path: String, reason: String },
}
