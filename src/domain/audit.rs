//! Thread records (ingest input) and audit records (classifier output).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::evidence::{ContradictionCandidate, EvidenceItem};

/// A raw thread/post record as produced by the ingestion collaborator.
///
/// Unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub selftext: String,

    #[serde(default)]
    pub subreddit: String,

    /// Epoch seconds (int or float) or an ISO string, passed through as given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadRecord {
    /// Title and body joined the way the classifier sees them.
    pub fn combined_text(&self) -> String {
        format!("{}\n{}", self.title, self.selftext).trim().to_string()
    }
}

/// One classified thread, optionally augmented with contradiction evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub thread_id: String,

    #[serde(default)]
    pub subreddit: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selftext: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<Value>,

    #[serde(default)]
    pub flags: Vec<String>,

    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub evidence: Vec<String>,

    /// sha256 of the classified text
    #[serde(default)]
    pub input_sha256: String,

    /// Token of the `audit_flagged` provenance event, if one was emitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contradiction_hits: Option<Vec<EvidenceItem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contradiction_score: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditRecord {
    /// Named fields; collaborator extras with these keys are not carried over.
    pub const FIELDS: &'static [&'static str] = &[
        "thread_id",
        "subreddit",
        "title",
        "selftext",
        "created_utc",
        "flags",
        "confidence",
        "evidence",
        "input_sha256",
        "provenance_id",
        "contradiction_hits",
        "contradiction_score",
    ];

    pub fn has_any_flag(&self, wanted: &[String]) -> bool {
        self.flags.iter().any(|f| wanted.iter().any(|w| w == f))
    }

    /// The candidate submitted for evidence retrieval.
    pub fn to_candidate(&self) -> ContradictionCandidate {
        let scoreable_text = if self.selftext.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.selftext)
        };

        ContradictionCandidate {
            claim_excerpt: self.title.clone(),
            thread_id: self.thread_id.clone(),
            subreddit: self.subreddit.clone(),
            scoreable_text,
        }
    }

    /// Replace any previous attachment with fresh evidence and score.
    pub fn attach_contradictions(&mut self, hits: Vec<EvidenceItem>, score: f64) {
        self.contradiction_hits = Some(hits);
        self.contradiction_score = Some(score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(flags: &[&str]) -> AuditRecord {
        AuditRecord {
            thread_id: "t1".to_string(),
            subreddit: "r/science".to_string(),
            title: "Claim about quantum physics".to_string(),
            selftext: String::new(),
            created_utc: None,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            confidence: 0.65,
            evidence: Vec::new(),
            input_sha256: String::new(),
            provenance_id: None,
            contradiction_hits: None,
            contradiction_score: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_thread_record_keeps_unknown_fields() {
        let line = r#"{"id":"abc","title":"T","selftext":"S","subreddit":"r/x","created_utc":5,"num_comments":3}"#;
        let thread: ThreadRecord = serde_json::from_str(line).unwrap();
        assert_eq!(thread.extra.get("num_comments"), Some(&Value::from(3)));
        assert_eq!(thread.combined_text(), "T\nS");

        let back = serde_json::to_value(&thread).unwrap();
        assert_eq!(back["num_comments"], 3);
    }

    #[test]
    fn test_created_utc_accepts_any_scalar() {
        for (raw, expected) in [
            ("1700000000", json!(1700000000)),
            ("1700000000.5", json!(1700000000.5)),
            (r#""2024-01-01T00:00:00""#, json!("2024-01-01T00:00:00")),
        ] {
            let line = format!(r#"{{"id":"a","created_utc":{}}}"#, raw);
            let thread: ThreadRecord = serde_json::from_str(&line).unwrap();
            assert_eq!(thread.created_utc, Some(expected.clone()));
            assert_eq!(serde_json::to_value(&thread).unwrap()["created_utc"], expected);
        }
    }

    #[test]
    fn test_candidate_from_record() {
        let mut rec = record(&["GPT_style"]);
        assert_eq!(rec.to_candidate().scoreable_text, "Claim about quantum physics");

        rec.selftext = "More text".to_string();
        let candidate = rec.to_candidate();
        assert_eq!(candidate.claim_excerpt, "Claim about quantum physics");
        assert_eq!(candidate.scoreable_text, "Claim about quantum physics More text");
    }

    #[test]
    fn test_flag_matching() {
        let wanted = vec!["GPT_style".to_string(), "CitationPattern".to_string()];
        assert!(record(&["GPT_style"]).has_any_flag(&wanted));
        assert!(!record(&["NoFlag"]).has_any_flag(&wanted));
    }

    #[test]
    fn test_attach_overwrites_previous() {
        let mut rec = record(&["GPT_style"]);
        rec.attach_contradictions(vec![EvidenceItem::new("a", "", "x", "", 0.0)], 0.4);
        rec.attach_contradictions(Vec::new(), 0.0);
        assert_eq!(rec.contradiction_hits.as_ref().map(Vec::len), Some(0));
        assert_eq!(rec.contradiction_score, Some(0.0));
    }

    #[test]
    fn test_unaugmented_record_omits_contradiction_fields() {
        let json = serde_json::to_string(&record(&["NoFlag"])).unwrap();
        assert!(!json.contains("contradiction_hits"));
        assert!(!json.contains("contradiction_score"));
    }
}
