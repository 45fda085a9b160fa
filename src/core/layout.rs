//! On-disk layout shared by the pipeline stages.
//!
//! ```text
//! <data>/raw/<sub>_threads.ndjson
//! <data>/audits/<sub>_audit.json
//! <data>/contradictions/<sub>_contradictions.json
//! <docs>/CONTRADICTIONS.md
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const THREADS_SUFFIX: &str = "_threads.ndjson";
const AUDIT_SUFFIX: &str = "_audit.json";
const CONTRADICTIONS_SUFFIX: &str = "_contradictions.json";

/// Name of the rendered report
pub const REPORT_FILE: &str = "CONTRADICTIONS.md";

/// Stage input/output directories
#[derive(Debug, Clone, PartialEq)]
pub struct DataLayout {
    pub inbox: PathBuf,
    pub raw: PathBuf,
    pub audits: PathBuf,
    pub contradictions: PathBuf,
    pub docs: PathBuf,
}

impl DataLayout {
    /// Standard layout under `data_dir`, with an explicit inbox and docs dir.
    pub fn new(data_dir: &Path, inbox: impl Into<PathBuf>, docs: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            raw: data_dir.join("raw"),
            audits: data_dir.join("audits"),
            contradictions: data_dir.join("contradictions"),
            docs: docs.into(),
        }
    }

    /// Layout with inbox and docs also under `data_dir`.
    pub fn under(data_dir: &Path) -> Self {
        Self::new(data_dir, data_dir.join("inbox"), data_dir.join("docs"))
    }

    pub fn threads_file(&self, subreddit: &str) -> PathBuf {
        self.raw
            .join(format!("{}{}", file_stem_for(subreddit), THREADS_SUFFIX))
    }

    pub fn audit_file(&self, subreddit: &str) -> PathBuf {
        self.audits
            .join(format!("{}{}", file_stem_for(subreddit), AUDIT_SUFFIX))
    }

    pub fn contradictions_file(&self, subreddit: &str) -> PathBuf {
        self.contradictions
            .join(format!("{}{}", file_stem_for(subreddit), CONTRADICTIONS_SUFFIX))
    }

    pub fn report_file(&self) -> PathBuf {
        self.docs.join(REPORT_FILE)
    }

    pub fn thread_files(&self) -> io::Result<Vec<PathBuf>> {
        list_with_suffix(&self.raw, THREADS_SUFFIX)
    }

    pub fn audit_files(&self) -> io::Result<Vec<PathBuf>> {
        list_with_suffix(&self.audits, AUDIT_SUFFIX)
    }

    pub fn contradiction_files(&self) -> io::Result<Vec<PathBuf>> {
        list_with_suffix(&self.contradictions, CONTRADICTIONS_SUFFIX)
    }

    /// NDJSON files waiting in the inbox
    pub fn inbox_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = list_with_suffix(&self.inbox, ".ndjson")?;
        files.extend(list_with_suffix(&self.inbox, ".jsonl")?);
        files.sort();
        Ok(files)
    }
}

/// Filesystem-safe stem: `r/Machine Learning` -> `Machine_Learning`
pub fn file_stem_for(subreddit: &str) -> String {
    let trimmed = subreddit.trim();
    let name = trimmed
        .strip_prefix("r/")
        .or_else(|| trimmed.strip_prefix("/r/"))
        .unwrap_or(trimmed);
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.trim_matches('_').is_empty() {
        "unknown".to_string()
    } else {
        stem
    }
}

/// Subreddit stem of a stage file, e.g. `science` for `science_audit.json`.
pub fn stem_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    [THREADS_SUFFIX, AUDIT_SUFFIX, CONTRADICTIONS_SUFFIX]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// Sorted list of regular files in `dir` ending in `suffix`; a missing
/// directory yields an empty list.
fn list_with_suffix(dir: &Path, suffix: &str) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(suffix) && !name.starts_with('.') && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
