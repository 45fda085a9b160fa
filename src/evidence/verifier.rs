//! Title-overlap verification of evidence items against a claim.

use std::collections::HashSet;

use crate::domain::{tokenize, EvidenceItem, VerificationStatus};

/// Minimum `match_score` for an item to count as verified
pub const DEFAULT_VERIFICATION_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvidenceVerifier {
    pub threshold: f64,
}

impl Default for EvidenceVerifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VERIFICATION_THRESHOLD,
        }
    }
}

impl EvidenceVerifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Set `match_score` and `verification_status` on `item`.
    ///
    /// Any status the item arrived with is overwritten.
    pub fn verify(&self, mut item: EvidenceItem, claim_tokens: &HashSet<String>) -> EvidenceItem {
        let score = match_score(&item.title, claim_tokens);
        item.match_score = score;
        item.verification_status = if score >= self.threshold {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverified
        };
        item
    }

    pub fn verify_all(&self, items: Vec<EvidenceItem>, claim_tokens: &HashSet<String>) -> Vec<EvidenceItem> {
        items
            .into_iter()
            .map(|item| self.verify(item, claim_tokens))
            .collect()
    }
}

/// `|title_tokens ∩ claim_tokens| / |claim_tokens|`, 0 for an empty claim.
pub fn match_score(title: &str, claim_tokens: &HashSet<String>) -> f64 {
    if claim_tokens.is_empty() {
        return 0.0;
    }
    let title_tokens = tokenize(title);
    let overlap = title_tokens.intersection(claim_tokens).count();
    overlap as f64 / claim_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_full_overlap_verified() {
        let item = EvidenceItem::new("1", "", "The quick brown fox", "", 0.0);
        let verified = EvidenceVerifier::default().verify(item, &tokens(&["quick", "brown", "fox"]));

        assert_eq!(verified.match_score, 1.0);
        assert_eq!(verified.verification_status, VerificationStatus::Verified);
    }

    #[test]
    fn test_partial_overlap_below_threshold() {
        let item = EvidenceItem::new("1", "", "quick fox", "", 0.0);
        let verified = EvidenceVerifier::default().verify(item, &tokens(&["quick", "brown", "fox", "jumps"]));

        assert_eq!(verified.match_score, 0.5);
        assert_eq!(verified.verification_status, VerificationStatus::Unverified);
    }

    #[test]
    fn test_empty_claim_and_empty_title() {
        let verifier = EvidenceVerifier::default();

        let item = verifier.verify(EvidenceItem::new("1", "", "anything", "", 0.0), &HashSet::new());
        assert_eq!(item.match_score, 0.0);
        assert!(!item.is_verified());

        let item = verifier.verify(EvidenceItem::new("2", "", "", "", 0.0), &tokens(&["a"]));
        assert_eq!(item.match_score, 0.0);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let item = EvidenceItem::new("1", "", "quick fox", "", 0.0);
        let claim = tokens(&["quick", "brown", "fox", "jumps"]);
        assert!(EvidenceVerifier::new(0.5).verify(item, &claim).is_verified());
    }

    #[test]
    fn test_title_case_ignored() {
        let item = EvidenceItem::new("1", "", "QUANTUM Physics", "", 0.0);
        let verified = EvidenceVerifier::default().verify(item, &tokenize("quantum physics"));
        assert_eq!(verified.match_score, 1.0);
    }
}
