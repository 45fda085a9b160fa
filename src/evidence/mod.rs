//! Evidence verification and contradiction scoring.
//!
//! Both stages are pure and deterministic:
//!
//! - **Verification**: an evidence item's title is compared with the claim's
//!   token set; an item whose overlap reaches the threshold is `verified`.
//! - **Scoring**: verified match quality raises the score, every unverified
//!   item lowers it by a fixed penalty, and the result is clamped to [0, 1].
//!
//! # Example
//!
//! ```ignore
//! use jules::evidence::{ContradictionScorer, EvidenceVerifier};
//!
//! let verifier = EvidenceVerifier::default();
//! let verified: Vec<_> = items
//!     .into_iter()
//!     .map(|item| verifier.verify(item, &candidate.claim_tokens()))
//!     .collect();
//! let score = ContradictionScorer::default().score(&verified);
//! ```

pub mod scorer;
pub mod verifier;

pub use scorer::{ContradictionScorer, DEFAULT_UNVERIFIED_PENALTY};
pub use verifier::{match_score, EvidenceVerifier, DEFAULT_VERIFICATION_THRESHOLD};
