//! Aggregation of verified and unverified evidence into one score.

use crate::domain::EvidenceItem;

/// Amount subtracted per unverified item
pub const DEFAULT_UNVERIFIED_PENALTY: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContradictionScorer {
    pub unverified_penalty: f64,
}

impl Default for ContradictionScorer {
    fn default() -> Self {
        Self {
            unverified_penalty: DEFAULT_UNVERIFIED_PENALTY,
        }
    }
}

impl ContradictionScorer {
    pub fn new(unverified_penalty: f64) -> Self {
        Self { unverified_penalty }
    }

    /// Mean verified `match_score` minus the penalty per unverified item,
    /// clamped to [0, 1]. An empty list scores 0.
    pub fn score(&self, evidence: &[EvidenceItem]) -> f64 {
        let (verified, unverified): (Vec<&EvidenceItem>, Vec<&EvidenceItem>) =
            evidence.iter().partition(|item| item.is_verified());

        let mean = if verified.is_empty() {
            0.0
        } else {
            verified.iter().map(|item| item.match_score).sum::<f64>() / verified.len() as f64
        };
        let penalty = self.unverified_penalty * unverified.len() as f64;

        (mean - penalty).clamp(0.0, 1.0)
    }
}
