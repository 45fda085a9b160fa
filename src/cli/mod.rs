//! Command-line interface for jules.
//!
//! Provides commands for running the audit pipeline, querying and
//! verifying the provenance ledger, and inspecting configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::config::{self, ResolvedConfig};
use crate::core::AuditPipeline;
use crate::domain::{RunReport, StageSelection};
use crate::provenance::EventFilter;

/// jules - provenance-tracked audit of suspected LLM-generated threads
#[derive(Parser, Debug)]
#[command(name = "jules")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run pipeline stages
    Run {
        /// Stage to run: all, ingest, audit, expand_contradict or doc
        #[arg(short, long, default_value = "all")]
        stage: StageSelection,

        /// NDJSON thread files to ingest (defaults to the inbox)
        #[arg(short, long)]
        input: Vec<PathBuf>,

        /// Serve evidence from this JSON file instead of configured sources
        #[arg(long, value_name = "FIXTURE")]
        mock: Option<PathBuf>,
    },

    /// List provenance events
    Query {
        /// Filter by emitting module
        #[arg(short, long)]
        module: Option<String>,

        /// Filter by event type
        #[arg(short, long)]
        event_type: Option<String>,

        /// Only events at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of events to show (most recent)
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print full events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show provenance statistics
    Stats,

    /// Re-hash every provenance bundle and report mismatches
    Verify,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::load_config()?;

        match self.command {
            Commands::Run { stage, input, mock } => run_pipeline(&cfg, stage, input, mock).await,
            Commands::Query {
                module,
                event_type,
                since,
                limit,
                json,
            } => query_events(&cfg, module, event_type, since, limit, json),
            Commands::Stats => show_stats(&cfg),
            Commands::Verify => verify_ledger(&cfg),
            Commands::Config => show_config(&cfg),
        }
    }
}

/// Run the selected stages; exits non-zero if the run did not succeed
async fn run_pipeline(
    cfg: &ResolvedConfig,
    stage: StageSelection,
    inputs: Vec<PathBuf>,
    mock: Option<PathBuf>,
) -> Result<()> {
    let pipeline = AuditPipeline::from_config(cfg, mock.as_deref())?;
    let report = pipeline.run(stage, &inputs).await?;

    print_report(&report);
    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for stage in &report.stages {
        eprintln!(
            "  {:<18} in: {:>5}  out: {:>5}  failures: {}",
            stage.stage.as_str(),
            stage.records_in,
            stage.records_out,
            stage.failures
        );
        for output in &stage.outputs {
            eprintln!("      -> {}", output);
        }
    }

    match report.reason {
        None => eprintln!("\n[Run {} completed successfully]", report.run_id),
        Some(ref reason) => eprintln!("\n[Run {} failed: {}]", report.run_id, reason),
    }
}

/// List events matching the filter
fn query_events(
    cfg: &ResolvedConfig,
    module: Option<String>,
    event_type: Option<String>,
    since: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let ledger = cfg.open_ledger()?;
    let filter = EventFilter {
        module,
        event_type,
        since: since.as_deref().map(parse_since).transpose()?,
        token: None,
    };

    let events = ledger.query(&filter)?;
    let skip = events.len().saturating_sub(limit);

    if events.is_empty() {
        println!("No events found.");
        return Ok(());
    }

    for event in &events[skip..] {
        if json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            println!(
                "{}  {:<18} {:<18} {}",
                event.timestamp, event.module, event.event_type, event.token
            );
        }
    }

    if skip > 0 && !json {
        println!("({} older event(s) not shown)", skip);
    }
    Ok(())
}

fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid --since value: {} (use RFC 3339 or YYYY-MM-DD)", value))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date: {}", value))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

/// Print ledger statistics
fn show_stats(cfg: &ResolvedConfig) -> Result<()> {
    let stats = cfg.open_ledger()?.statistics()?;

    println!("Provenance directory: {}", cfg.provenance_dir.display());
    println!("Total events: {}", stats.total_events);
    if stats.unreadable > 0 {
        println!("Unreadable bundles: {}", stats.unreadable);
    }

    println!("\nBy module:");
    for (module, count) in &stats.by_module {
        println!("  {:<20} {}", module, count);
    }
    println!("\nBy event type:");
    for (event_type, count) in &stats.by_event_type {
        println!("  {:<20} {}", event_type, count);
    }
    println!("\nBy date:");
    for (date, count) in &stats.by_date {
        println!("  {:<20} {}", date, count);
    }

    Ok(())
}

/// Verify every bundle; exits non-zero on any problem
fn verify_ledger(cfg: &ResolvedConfig) -> Result<()> {
    let report = cfg.open_ledger()?.verify_integrity()?;

    for (file, problem) in &report.problems {
        println!("FAIL {}: {}", file, problem);
    }
    println!(
        "Checked {} bundle(s), {} problem(s)",
        report.checked,
        report.problems.len()
    );

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("jules configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    if let Some(ref version) = cfg.config_version {
        println!("Version:     {}", version);
    }
    println!("Commit:      {}", cfg.commit_sha);
    println!();
    println!("Paths:");
    println!("  Home:        {}", cfg.home.display());
    println!("  Data:        {}", cfg.data_dir.display());
    println!("  Inbox:       {}", cfg.inbox.display());
    println!("  Docs:        {}", cfg.docs_dir.display());
    println!("  Provenance:  {}", cfg.provenance_dir.display());
    println!("  Trace log:   {}", cfg.trace_log.display());
    println!();
    println!("Scoring:");
    println!("  Verification threshold: {}", cfg.scoring.verification_threshold);
    println!("  Unverified penalty:     {}", cfg.scoring.unverified_penalty);
    println!();
    println!("Retry:");
    println!(
        "  {} attempts, {}ms initial delay, x{} backoff, {}ms cap",
        cfg.retry.max_attempts,
        cfg.retry.initial_delay_ms,
        cfg.retry.backoff_multiplier,
        cfg.retry.max_delay_ms
    );
    println!();
    println!("Sources:");
    if cfg.sources.is_empty() {
        println!("  (none - use `run --mock <fixture>` for offline runs)");
    }
    for source in &cfg.sources {
        println!(
            "  {:<16} {:?} {}",
            source.name,
            source.kind,
            source
                .endpoint
                .as_deref()
                .or(source.fixture.as_deref().and_then(|p| p.to_str()))
                .unwrap_or("")
        );
    }
    println!();
    println!("Pipeline:");
    println!("  top_k: {}  doc_top_n: {}", cfg.pipeline.top_k, cfg.pipeline.doc_top_n);
    println!("  Candidate flags: {}", cfg.pipeline.candidate_flags.join(", "));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "jules", "run", "--stage", "expand_contradict", "--mock", "fixture.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { stage, input, mock } => {
                assert_eq!(stage, StageSelection::Only(crate::domain::Stage::ExpandContradict));
                assert!(input.is_empty());
                assert_eq!(mock, Some(PathBuf::from("fixture.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_stage_rejected() {
        assert!(Cli::try_parse_from(["jules", "run", "--stage", "publish"]).is_err());
    }

    #[test]
    fn test_parse_since() {
        let day = parse_since("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_since("2024-03-01T12:00:00Z").is_ok());
        assert!(parse_since("yesterday").is_err());
    }
}
