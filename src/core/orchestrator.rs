//! Main orchestrator for audit pipeline runs.
//!
//! Sequences the stages, records every stage transition in the trace log,
//! and turns stage outcomes into a `RunReport`. The stages themselves live
//! in `stages.rs`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::ExternalQueryAdapter;
use crate::audit::{Classifier, HeuristicClassifier};
use crate::config::{PipelineConfig, ResolvedConfig};
use crate::domain::event_types;
use crate::domain::{RunReport, Stage, StageReport, StageSelection};
use crate::evidence::{ContradictionScorer, EvidenceVerifier};
use crate::provenance::ProvenanceLedger;

use super::layout::DataLayout;
use super::safety::IngestLimits;

/// Agent name on trace entries written by the orchestrator
pub const TRACE_AGENT: &str = "pipeline";

/// Stage tuning and ingest limits
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub pipeline: PipelineConfig,
    pub ingest: IngestLimits,
}

/// Main audit pipeline orchestrator
pub struct AuditPipeline {
    pub(super) ledger: ProvenanceLedger,
    pub(super) layout: DataLayout,
    pub(super) adapters: Vec<ExternalQueryAdapter>,
    pub(super) verifier: EvidenceVerifier,
    pub(super) scorer: ContradictionScorer,
    pub(super) classifier: Box<dyn Classifier>,
    pub(super) settings: PipelineSettings,
}

impl AuditPipeline {
    /// Create a pipeline with default scoring and the heuristic classifier
    pub fn new(ledger: ProvenanceLedger, layout: DataLayout, adapters: Vec<ExternalQueryAdapter>) -> Self {
        Self {
            ledger,
            layout,
            adapters,
            verifier: EvidenceVerifier::default(),
            scorer: ContradictionScorer::default(),
            classifier: Box::new(HeuristicClassifier::default()),
            settings: PipelineSettings::default(),
        }
    }

    /// Build everything from resolved configuration. `mock_fixture` replaces
    /// the configured sources with a single fixture source.
    pub fn from_config(config: &ResolvedConfig, mock_fixture: Option<&Path>) -> Result<Self> {
        let ledger = config.open_ledger()?;
        let adapters = config.build_adapters(mock_fixture)?;

        Ok(Self::new(ledger, config.layout(), adapters)
            .with_verifier(EvidenceVerifier::new(config.scoring.verification_threshold))
            .with_scorer(ContradictionScorer::new(config.scoring.unverified_penalty))
            .with_settings(PipelineSettings {
                pipeline: config.pipeline.clone(),
                ingest: config.ingest.clone(),
            }))
    }

    pub fn with_verifier(mut self, verifier: EvidenceVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_scorer(mut self, scorer: ContradictionScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn ledger(&self) -> &ProvenanceLedger {
        &self.ledger
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Run the selected stages in order.
    ///
    /// Per-item failures are counted and the stage carries on; a stage that
    /// returns an error stops the run. Either way the run finishes with a
    /// `run_finish` trace entry carrying `success` and `reason`. Only trace
    /// log I/O failures are returned as `Err`.
    #[instrument(skip(self, inputs), fields(stages = ?selection))]
    pub async fn run(&self, selection: StageSelection, inputs: &[PathBuf]) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let mut report = RunReport::new(run_id);
        let stages = selection.stages();
        info!(%run_id, "Starting audit run");

        self.ledger.trace(
            TRACE_AGENT,
            event_types::RUN_START,
            json!({
                "run_id": run_id,
                "stages": stages.iter().map(Stage::as_str).collect::<Vec<_>>(),
            }),
        )?;

        for stage in stages {
            self.ledger.trace(
                TRACE_AGENT,
                event_types::STAGE_START,
                json!({"run_id": run_id, "stage": stage}),
            )?;
            let started = Instant::now();

            match self.run_stage(stage, inputs).await {
                Ok(stage_report) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    self.ledger.trace(
                        TRACE_AGENT,
                        event_types::STAGE_COMPLETE,
                        json!({
                            "run_id": run_id,
                            "stage": stage,
                            "records_in": stage_report.records_in,
                            "records_out": stage_report.records_out,
                            "failures": stage_report.failures,
                            "outputs": stage_report.outputs,
                            "duration_ms": duration_ms,
                        }),
                    )?;

                    if stage_report.succeeded() {
                        info!(
                            %stage,
                            records_in = stage_report.records_in,
                            records_out = stage_report.records_out,
                            duration_ms,
                            "Stage completed"
                        );
                    } else {
                        warn!(%stage, failures = stage_report.failures, "Stage completed with failures");
                        report.fail(format!("{}: {} item(s) failed", stage, stage_report.failures));
                    }
                    report.stages.push(stage_report);
                }
                Err(e) => {
                    error!(%stage, error = %format!("{:#}", e), "Stage failed");
                    self.ledger.trace(
                        TRACE_AGENT,
                        event_types::STAGE_FAILED,
                        json!({"run_id": run_id, "stage": stage, "error": format!("{:#}", e)}),
                    )?;
                    report.fail(format!("{}: {:#}", stage, e));
                    break;
                }
            }
        }

        self.ledger.trace(
            TRACE_AGENT,
            event_types::RUN_FINISH,
            json!({
                "run_id": run_id,
                "success": report.success,
                "reason": report.reason,
                "stages": report.stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
            }),
        )?;

        if report.success {
            info!(%run_id, "Audit run finished");
        } else {
            warn!(%run_id, reason = ?report.reason, "Audit run finished with failures");
        }
        Ok(report)
    }

    async fn run_stage(&self, stage: Stage, inputs: &[PathBuf]) -> Result<StageReport> {
        match stage {
            Stage::Ingest => self.ingest(inputs),
            Stage::Audit => self.audit(),
            Stage::ExpandContradict => self.expand_contradict().await,
            Stage::Doc => self.doc(),
        }
    }
}
