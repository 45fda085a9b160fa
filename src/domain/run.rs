//! Pipeline stages and run reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Normalize collaborator NDJSON into per-subreddit thread files
    Ingest,

    /// Classify threads into audit records
    Audit,

    /// Fetch, verify and score evidence for flagged records
    ExpandContradict,

    /// Render the contradiction report
    Doc,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Ingest,
        Stage::Audit,
        Stage::ExpandContradict,
        Stage::Doc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Audit => "audit",
            Stage::ExpandContradict => "expand_contradict",
            Stage::Doc => "doc",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stages a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelection {
    All,
    Only(Stage),
}

impl StageSelection {
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            StageSelection::All => Stage::ALL.to_vec(),
            StageSelection::Only(stage) => vec![*stage],
        }
    }
}

impl Default for StageSelection {
    fn default() -> Self {
        Self::All
    }
}

impl FromStr for StageSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            other => Stage::ALL
                .iter()
                .find(|stage| stage.as_str() == other)
                .map(|stage| Self::Only(*stage))
                .ok_or_else(|| format!("unknown stage '{}'", other)),
        }
    }
}

/// Outcome of one executed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,

    /// Records read by the stage
    pub records_in: usize,

    /// Records written by the stage
    pub records_out: usize,

    /// Per-item failures that did not abort the stage
    pub failures: usize,

    /// Files written
    pub outputs: Vec<String>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            records_in: 0,
            records_out: 0,
            failures: 0,
            outputs: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failures == 0
    }
}

/// Summary of a whole pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stages: Vec<StageReport>,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            stages: Vec::new(),
            success: true,
            reason: None,
        }
    }

    /// Mark the run failed, keeping the first reason recorded.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.success = false;
        if self.reason.is_none() {
            self.reason = Some(reason.into());
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_selection_parsing() {
        assert_eq!("all".parse::<StageSelection>().unwrap(), StageSelection::All);
        assert_eq!(
            "expand_contradict".parse::<StageSelection>().unwrap(),
            StageSelection::Only(Stage::ExpandContradict)
        );
        assert!("publish".parse::<StageSelection>().is_err());
    }

    #[test]
    fn test_all_runs_in_order() {
        assert_eq!(
            StageSelection::All.stages(),
            vec![Stage::Ingest, Stage::Audit, Stage::ExpandContradict, Stage::Doc]
        );
    }

    #[test]
    fn test_run_report_keeps_first_reason() {
        let mut report = RunReport::new(Uuid::new_v4());
        assert!(report.success);
        report.fail("audit: no input");
        report.fail("doc: failed");
        assert!(!report.success);
        assert_eq!(report.reason.as_deref(), Some("audit: no input"));
    }
}
