//! Phrase-list classifier for suspected LLM-generated threads.
//!
//! Lowercase substring matching against fixed phrase lists. Anything
//! implementing `Classifier` can stand in for it in the audit stage.

use serde::{Deserialize, Serialize};

/// Flag names written into audit records
pub mod flags {
    pub const GPT_STYLE: &str = "GPT_style";
    pub const CITATION_PATTERN: &str = "CitationPattern";
    pub const MISUSE_TERMINOLOGY: &str = "MisuseTerminology";
    pub const NO_FLAG: &str = "NoFlag";
}

const GPT_STYLE_PHRASES: &[&str] = &[
    "as an ai language model",
    "as a large language model",
    "i don't have personal",
    "it's important to note",
    "it is important to note",
    "delve into",
    "in conclusion,",
    "tapestry of",
    "i hope this helps",
    "certainly! here",
];

const CITATION_PHRASES: &[&str] = &["[1]", "[2]", "et al.", "doi:", "doi.org/", "arxiv", "(20"];

const MISUSE_TERMS: &[&str] = &[
    "quantum consciousness",
    "quantum mind",
    "emergent sentience",
    "digital consciousness",
    "sentient ai",
    "ai is conscious",
    "recursive self-awareness",
    "resonance field",
];

/// Classifier verdict for one block of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub flags: Vec<String>,
    pub confidence: f64,
    /// Short reasons, one per matched detector or term
    pub evidence: Vec<String>,
}

/// Turns thread text into audit flags
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}

/// Default phrase-based classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicClassifier {
    pub gpt_style_phrases: Vec<String>,
    pub citation_phrases: Vec<String>,
    pub misuse_terms: Vec<String>,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            gpt_style_phrases: owned(GPT_STYLE_PHRASES),
            citation_phrases: owned(CITATION_PHRASES),
            misuse_terms: owned(MISUSE_TERMS),
        }
    }
}

impl Classifier for HeuristicClassifier {
    fn classify(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();
        let mut flag_list = Vec::new();
        let mut evidence = Vec::new();

        if contains_any(&lower, &self.gpt_style_phrases) {
            flag_list.push(flags::GPT_STYLE.to_string());
            evidence.push("gpt_style_phrase".to_string());
        }
        if contains_any(&lower, &self.citation_phrases) {
            flag_list.push(flags::CITATION_PATTERN.to_string());
            evidence.push("citation_pattern".to_string());
        }

        let misuse: Vec<String> = self
            .misuse_terms
            .iter()
            .filter(|term| lower.contains(&term.to_lowercase()))
            .cloned()
            .collect();
        if !misuse.is_empty() {
            flag_list.push(flags::MISUSE_TERMINOLOGY.to_string());
            evidence.extend(misuse);
        }

        if flag_list.is_empty() {
            flag_list.push(flags::NO_FLAG.to_string());
        }

        // NoFlag counts as one flag
        let confidence = (0.5 + 0.15 * flag_list.len() as f64).min(0.95);

        Classification {
            flags: flag_list,
            confidence,
            evidence,
        }
    }
}

fn contains_any(lower: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| lower.contains(&p.to_lowercase()))
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
