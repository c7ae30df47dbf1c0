//! Pipeline row types: transcript chunks, extracted facts, aggregated inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fact type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed set of atomic fact categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    Statement,
    Proposal,
    Question,
    Decision,
    Action,
    Constraint,
    Agreement,
    Disagreement,
    Clarification,
    Condition,
    Reminder,
}

impl FactType {
    pub const ALL: [FactType; 11] = [
        FactType::Statement,
        FactType::Proposal,
        FactType::Question,
        FactType::Decision,
        FactType::Action,
        FactType::Constraint,
        FactType::Agreement,
        FactType::Disagreement,
        FactType::Clarification,
        FactType::Condition,
        FactType::Reminder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Statement => "statement",
            FactType::Proposal => "proposal",
            FactType::Question => "question",
            FactType::Decision => "decision",
            FactType::Action => "action",
            FactType::Constraint => "constraint",
            FactType::Agreement => "agreement",
            FactType::Disagreement => "disagreement",
            FactType::Clarification => "clarification",
            FactType::Condition => "condition",
            FactType::Reminder => "reminder",
        }
    }

    /// Parse a model-supplied value. Unknown values normalize to
    /// `Statement` so one sloppy label never drops a fact.
    pub fn parse_lenient(value: &str) -> FactType {
        match value.trim().to_lowercase().as_str() {
            "proposal" => FactType::Proposal,
            "question" => FactType::Question,
            "decision" => FactType::Decision,
            "action" => FactType::Action,
            "constraint" => FactType::Constraint,
            "agreement" => FactType::Agreement,
            "disagreement" => FactType::Disagreement,
            "clarification" => FactType::Clarification,
            "condition" => FactType::Condition,
            "reminder" => FactType::Reminder,
            _ => FactType::Statement,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One chunk of a meeting transcript. `(meeting_id, chunk_index)` is
/// unique; `chunk_index` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub chunk_index: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub speaker: Option<String>,
    pub content: String,
    /// Where the transcript came from (e.g. "google_meet").
    pub source_label: String,
}

/// An atomic fact extracted from one chunk.
///
/// `group_label` stays `None` until the grouping node runs; afterwards it
/// is always a normalized non-empty label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub source_chunk_id: Uuid,
    #[serde(default)]
    pub speaker: Option<String>,
    pub fact_type: FactType,
    pub fact_content: String,
    /// Confidence 0..=100.
    pub certainty: u8,
    #[serde(default)]
    pub group_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Clamp a model-supplied certainty into 0..=100.
pub fn clamp_certainty(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

/// The aggregated per-group output row, the pipeline's terminal
/// artifact for downstream publishers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRecord {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub group_label: String,
    pub input_content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_type_roundtrip() {
        for ft in FactType::ALL {
            let json = serde_json::to_string(&ft).unwrap();
            assert_eq!(json, format!("\"{}\"", ft.as_str()));
            let back: FactType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, ft);
        }
    }

    #[test]
    fn lenient_parse_falls_back_to_statement() {
        assert_eq!(FactType::parse_lenient("decision"), FactType::Decision);
        assert_eq!(FactType::parse_lenient(" Action "), FactType::Action);
        assert_eq!(FactType::parse_lenient("opinion"), FactType::Statement);
        assert_eq!(FactType::parse_lenient(""), FactType::Statement);
    }

    #[test]
    fn certainty_is_clamped() {
        assert_eq!(clamp_certainty(-5), 0);
        assert_eq!(clamp_certainty(0), 0);
        assert_eq!(clamp_certainty(70), 70);
        assert_eq!(clamp_certainty(250), 100);
    }
}
