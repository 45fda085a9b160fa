//! Configuration for jules.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (JULES_HOME, JULES_PROVENANCE_DIR, GIT_COMMIT_SHA)
//! 2. Config file (.jules/config.yaml)
//! 3. Defaults (~/.jules)
//!
//! Config file discovery:
//! - Searches the start directory and its parents for .jules/config.yaml
//! - Relative paths in the file resolve against the project root (the
//!   directory containing .jules/)
//!
//! The resolved value is passed explicitly to the ledger and pipeline; there
//! is no process-wide cache.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{
    EvidenceSource, ExternalQueryAdapter, HttpEvidenceSource, HttpSourceKind, Redactor, RetryPolicy,
    StaticEvidenceSource,
};
use crate::core::layout::DataLayout;
use crate::core::safety::IngestLimits;
use crate::evidence::{DEFAULT_UNVERIFIED_PENALTY, DEFAULT_VERIFICATION_THRESHOLD};
use crate::provenance::ProvenanceLedger;

const CONFIG_DIR: &str = ".jules";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub redaction: Redactor,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ingest: IngestLimits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory
    pub home: Option<String>,
    /// Stage data directory (default: <home>/data)
    pub data_dir: Option<String>,
    /// Provenance bundle directory (default: <home>/provenance)
    pub provenance_dir: Option<String>,
    /// Trace log file (default: <home>/trace.jsonl)
    pub trace_log: Option<String>,
    /// Rendered reports (default: <data>/docs)
    pub docs_dir: Option<String>,
    /// Ingest inbox (default: <data>/inbox)
    pub inbox: Option<String>,
}

/// Verification threshold and contradiction penalty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_threshold")]
    pub verification_threshold: f64,
    #[serde(default = "default_penalty")]
    pub unverified_penalty: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_VERIFICATION_THRESHOLD
}
fn default_penalty() -> f64 {
    DEFAULT_UNVERIFIED_PENALTY
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            verification_threshold: default_threshold(),
            unverified_penalty: default_penalty(),
        }
    }
}

/// Stage tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Evidence items requested per candidate and source
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Records listed in the contradiction report
    #[serde(default = "default_doc_top_n")]
    pub doc_top_n: usize,

    /// Audit flags that make a record a contradiction candidate
    #[serde(default = "default_candidate_flags")]
    pub candidate_flags: Vec<String>,
}

fn default_top_k() -> usize {
    3
}
fn default_doc_top_n() -> usize {
    25
}
fn default_candidate_flags() -> Vec<String> {
    vec!["GPT_style".to_string(), "CitationPattern".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            doc_top_n: default_doc_top_n(),
            candidate_flags: default_candidate_flags(),
        }
    }
}

/// Kind of configured evidence source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Search,
    ChatCompletion,
    Fixture,
}

/// One configured evidence source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    /// JSON body served by a fixture source
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    #[serde(default = "default_source_timeout")]
    pub timeout_seconds: u64,
}

fn default_source_timeout() -> u64 {
    30
}

impl SourceConfig {
    /// Instantiate the source this entry describes.
    pub fn build(&self) -> Result<Arc<dyn EvidenceSource>> {
        let source: Arc<dyn EvidenceSource> = match self.kind {
            SourceKind::Fixture => {
                let path = self
                    .fixture
                    .as_ref()
                    .with_context(|| format!("Source '{}' needs a fixture path", self.name))?;
                Arc::new(StaticEvidenceSource::from_file(self.name.clone(), path)?)
            }
            SourceKind::Search | SourceKind::ChatCompletion => {
                let endpoint = self
                    .endpoint
                    .as_ref()
                    .with_context(|| format!("Source '{}' needs an endpoint", self.name))?;
                let kind = if self.kind == SourceKind::Search {
                    HttpSourceKind::Search
                } else {
                    HttpSourceKind::ChatCompletion
                };
                let mut source = HttpEvidenceSource::new(self.name.clone(), kind, endpoint.clone());
                if let Some(ref var) = self.api_key_env {
                    source = source.with_api_key_env(var)?;
                }
                if let Some(ref model) = self.model {
                    source = source.with_model(model.clone());
                }
                if let Some(ref instructions) = self.instructions {
                    source = source.with_instructions(instructions.clone());
                }
                Arc::new(source)
            }
        };
        Ok(source)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub home: PathBuf,
    pub data_dir: PathBuf,
    pub provenance_dir: PathBuf,
    pub trace_log: PathBuf,
    pub docs_dir: PathBuf,
    pub inbox: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// `version` declared by the config file
    pub config_version: Option<String>,
    /// Code version stamped on provenance events
    pub commit_sha: String,
    pub scoring: ScoringConfig,
    pub retry: RetryPolicy,
    pub redaction: Redactor,
    pub sources: Vec<SourceConfig>,
    pub pipeline: PipelineConfig,
    pub ingest: IngestLimits,
}

impl ResolvedConfig {
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir, self.inbox.clone(), self.docs_dir.clone())
    }

    pub fn open_ledger(&self) -> Result<ProvenanceLedger> {
        ProvenanceLedger::open(&self.provenance_dir, &self.trace_log, &self.commit_sha)
            .with_context(|| format!("Failed to open ledger at {}", self.provenance_dir.display()))
    }

    /// Query adapters for every configured source, or only `fixture` when
    /// running in mock mode.
    pub fn build_adapters(&self, mock_fixture: Option<&Path>) -> Result<Vec<ExternalQueryAdapter>> {
        if let Some(path) = mock_fixture {
            let source = StaticEvidenceSource::from_file("mock", path)?;
            return Ok(vec![self.wrap(Arc::new(source), Duration::from_secs(5))]);
        }

        self.sources
            .iter()
            .map(|cfg| {
                let source = cfg
                    .build()
                    .with_context(|| format!("Failed to configure source '{}'", cfg.name))?;
                Ok(self.wrap(source, cfg.timeout()))
            })
            .collect()
    }

    fn wrap(&self, source: Arc<dyn EvidenceSource>, timeout: Duration) -> ExternalQueryAdapter {
        ExternalQueryAdapter::new(source)
            .with_policy(self.retry.clone())
            .with_timeout(timeout)
            .with_redactor(self.redaction.clone())
    }
}

/// Find config file by searching `start` and its parents
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration starting discovery from the current directory
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd, |name| std::env::var(name).ok())
}

/// Load configuration starting discovery from `start`, reading environment
/// overrides through `env`.
pub fn load_config_from(start: &Path, env: impl Fn(&str) -> Option<String>) -> Result<ResolvedConfig> {
    let config_file = find_config_file(start);
    let (file, base_dir) = match config_file {
        Some(ref path) => {
            let file = load_config_file(path)?;
            // Project root is the parent of .jules/
            let base = path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            (file, Some(base))
        }
        None => (ConfigFile::default(), None),
    };

    let from_file = |value: &Option<String>| -> Option<PathBuf> {
        match (value, &base_dir) {
            (Some(v), Some(base)) => Some(resolve_path(base, v)),
            (Some(v), None) => Some(PathBuf::from(v)),
            _ => None,
        }
    };

    let home = match env("JULES_HOME") {
        Some(home) => PathBuf::from(home),
        None => match from_file(&file.paths.home) {
            Some(home) => home,
            None => dirs::home_dir()
                .context("Failed to determine home directory")?
                .join(CONFIG_DIR),
        },
    };

    let data_dir = from_file(&file.paths.data_dir).unwrap_or_else(|| home.join("data"));
    let provenance_dir = env("JULES_PROVENANCE_DIR")
        .map(PathBuf::from)
        .or_else(|| from_file(&file.paths.provenance_dir))
        .unwrap_or_else(|| home.join("provenance"));
    let trace_log = from_file(&file.paths.trace_log).unwrap_or_else(|| home.join("trace.jsonl"));
    let docs_dir = from_file(&file.paths.docs_dir).unwrap_or_else(|| data_dir.join("docs"));
    let inbox = from_file(&file.paths.inbox).unwrap_or_else(|| data_dir.join("inbox"));

    validate(&file)?;

    Ok(ResolvedConfig {
        home,
        data_dir,
        provenance_dir,
        trace_log,
        docs_dir,
        inbox,
        commit_sha: resolve_commit_sha(&env, base_dir.as_deref().unwrap_or(start)),
        config_file,
        config_version: file.version,
        scoring: file.scoring,
        retry: file.retry,
        redaction: file.redaction,
        sources: file
            .sources
            .into_iter()
            .map(|mut source| {
                if let (Some(fixture), Some(base)) = (&source.fixture, &base_dir) {
                    if fixture.is_relative() {
                        source.fixture = Some(base.join(fixture));
                    }
                }
                source
            })
            .collect(),
        pipeline: file.pipeline,
        ingest: file.ingest,
    })
}

fn validate(file: &ConfigFile) -> Result<()> {
    let threshold = file.scoring.verification_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        bail!("scoring.verification_threshold must be within [0, 1], got {}", threshold);
    }
    if file.scoring.unverified_penalty < 0.0 {
        bail!("scoring.unverified_penalty must not be negative");
    }
    if file.retry.max_attempts == 0 {
        bail!("retry.max_attempts must be at least 1");
    }
    let mut names: Vec<&str> = file.sources.iter().map(|s| s.name.as_str()).collect();
    names.sort_unstable();
    if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
        bail!("duplicate source name '{}'", pair[0]);
    }
    Ok(())
}

/// `GIT_COMMIT_SHA`, else `git rev-parse HEAD` in `dir`, else "unknown".
fn resolve_commit_sha(env: &impl Fn(&str) -> Option<String>, dir: &Path) -> String {
    if let Some(sha) = env("GIT_COMMIT_SHA").filter(|s| !s.trim().is_empty()) {
        return sha.trim().to_string();
    }

    Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn write_config(root: &Path, yaml: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = load_config_from(
            temp.path(),
            env_from(&[("JULES_HOME", "/srv/jules"), ("GIT_COMMIT_SHA", "abc123")]),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/jules"));
        assert_eq!(config.data_dir, PathBuf::from("/srv/jules/data"));
        assert_eq!(config.provenance_dir, PathBuf::from("/srv/jules/provenance"));
        assert_eq!(config.trace_log, PathBuf::from("/srv/jules/trace.jsonl"));
        assert_eq!(config.commit_sha, "abc123");
        assert!(config.config_file.is_none());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.scoring.verification_threshold, 0.6);
        assert_eq!(config.pipeline.top_k, 3);
    }

    #[test]
    fn test_config_file_discovered_from_subdirectory() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            r#"
version: "1"
paths:
  home: state
  provenance_dir: .github/PROVENANCE
scoring:
  verification_threshold: 0.5
retry:
  max_attempts: 2
sources:
  - name: offline
    kind: fixture
    fixture: fixtures/evidence.json
pipeline:
  candidate_flags: [GPT_style]
"#,
        );
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = load_config_from(&nested, env_from(&[("GIT_COMMIT_SHA", "x")])).unwrap();
        assert_eq!(config.home, temp.path().join("state"));
        assert_eq!(config.provenance_dir, temp.path().join(".github/PROVENANCE"));
        assert_eq!(config.config_version.as_deref(), Some("1"));
        assert_eq!(config.scoring.verification_threshold, 0.5);
        assert_eq!(config.scoring.unverified_penalty, 0.2);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.sources[0].kind, SourceKind::Fixture);
        assert_eq!(
            config.sources[0].fixture,
            Some(temp.path().join("fixtures/evidence.json"))
        );
        assert_eq!(config.pipeline.candidate_flags, vec!["GPT_style".to_string()]);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "paths:\n  provenance_dir: prov\n");

        let config = load_config_from(
            temp.path(),
            env_from(&[
                ("JULES_HOME", "/env/home"),
                ("JULES_PROVENANCE_DIR", "/env/prov"),
                ("GIT_COMMIT_SHA", "x"),
            ]),
        )
        .unwrap();
        assert_eq!(config.home, PathBuf::from("/env/home"));
        assert_eq!(config.provenance_dir, PathBuf::from("/env/prov"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "scoring:\n  verification_threshold: 1.5\n");
        assert!(load_config_from(temp.path(), env_from(&[("JULES_HOME", "/h")])).is_err());

        write_config(
            temp.path(),
            "sources:\n  - {name: a, kind: fixture}\n  - {name: a, kind: search}\n",
        );
        assert!(load_config_from(temp.path(), env_from(&[("JULES_HOME", "/h")])).is_err());
    }

    #[test]
    fn test_source_build_requires_endpoint() {
        let source = SourceConfig {
            name: "s".to_string(),
            kind: SourceKind::Search,
            endpoint: None,
            api_key_env: None,
            model: None,
            instructions: None,
            fixture: None,
            timeout_seconds: 30,
        };
        assert!(source.build().is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");
        assert_eq!(resolve_path(&base, "./subdir"), PathBuf::from("/home/user/project/./subdir"));
        assert_eq!(resolve_path(&base, "/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
