//! Verification and Scoring Tests
//!
//! Properties of the verifier threshold and contradiction score across
//! mixed evidence sets.

use jules::domain::{tokenize, EvidenceItem, VerificationStatus};
use jules::evidence::{ContradictionScorer, EvidenceVerifier};

fn item(title: &str) -> EvidenceItem {
    EvidenceItem::new("", "", title, format!("snippet for {}", title), 0.0)
}

#[test]
fn test_threshold_is_inclusive() {
    let claim = tokenize("alpha beta gamma delta epsilon");
    let verifier = EvidenceVerifier::default();

    // 3 of 5 claim tokens = 0.6
    let at = verifier.verify(item("alpha beta gamma"), &claim);
    assert!((at.match_score - 0.6).abs() < 1e-9);
    assert_eq!(at.verification_status, VerificationStatus::Verified);

    let below = verifier.verify(item("alpha beta"), &claim);
    assert_eq!(below.verification_status, VerificationStatus::Unverified);
}

#[test]
fn test_incoming_status_is_overwritten() {
    let claim = tokenize("quantum physics");
    let mut forged = item("gardening tips");
    forged.verification_status = VerificationStatus::Verified;
    forged.match_score = 1.0;

    let checked = EvidenceVerifier::default().verify(forged, &claim);
    assert_eq!(checked.verification_status, VerificationStatus::Unverified);
    assert_eq!(checked.match_score, 0.0);
}

#[test]
fn test_score_stays_in_unit_interval() {
    let claim = tokenize("quantum physics is a theory");
    let verifier = EvidenceVerifier::default();
    let scorer = ContradictionScorer::default();
    let titles = [
        "quantum physics is a theory",
        "quantum physics",
        "unrelated",
        "physics is a theory",
        "",
    ];

    for n in 0..=titles.len() {
        let evidence = verifier.verify_all(titles[..n].iter().map(|t| item(t)).collect(), &claim);
        let score = scorer.score(&evidence);
        assert!((0.0..=1.0).contains(&score), "score {} out of range for {} items", score, n);
    }
}

#[test]
fn test_unverified_evidence_lowers_score() {
    let claim = tokenize("quantum physics");
    let verifier = EvidenceVerifier::default();
    let scorer = ContradictionScorer::default();

    let clean = verifier.verify_all(vec![item("quantum physics")], &claim);
    let noisy = verifier.verify_all(vec![item("quantum physics"), item("cooking")], &claim);

    assert!((scorer.score(&clean) - 1.0).abs() < 1e-9);
    assert!((scorer.score(&noisy) - 0.8).abs() < 1e-9);
    assert_eq!(scorer.score(&[]), 0.0);
}

#[test]
fn test_configured_penalty() {
    let claim = tokenize("quantum physics");
    let evidence = EvidenceVerifier::new(0.5).verify_all(
        vec![item("quantum"), item("cooking"), item("baking")],
        &claim,
    );

    // one verified at 0.5, two unverified
    let score = ContradictionScorer::new(0.1).score(&evidence);
    assert!((score - 0.3).abs() < 1e-9);
}
