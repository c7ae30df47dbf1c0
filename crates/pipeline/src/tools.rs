//! The closed write-tool set exposed to the model.
//!
//! Three tools, one per destination table. Dispatch is a match over the
//! tag; there is no open registry. Server-side validation owns every
//! security-relevant field: `meeting_id`, `source_chunk_id`, and
//! `created_at` are fixed by the caller, model-supplied values for them
//! are ignored.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use ms_domain::facts::{clamp_certainty, ExtractedFact, FactType};
use ms_llm::types::{ToolCall, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool set
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTool {
    InsertTranscriptChunks,
    InsertExtractedFacts,
    InsertInputs,
}

impl WriteTool {
    pub fn name(&self) -> &'static str {
        match self {
            WriteTool::InsertTranscriptChunks => "insert_transcript_chunks",
            WriteTool::InsertExtractedFacts => "insert_extracted_facts",
            WriteTool::InsertInputs => "insert_inputs",
        }
    }

    pub fn from_name(name: &str) -> Option<WriteTool> {
        match name {
            "insert_transcript_chunks" => Some(WriteTool::InsertTranscriptChunks),
            "insert_extracted_facts" => Some(WriteTool::InsertExtractedFacts),
            "insert_inputs" => Some(WriteTool::InsertInputs),
            _ => None,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        match self {
            WriteTool::InsertTranscriptChunks => ToolDefinition {
                name: self.name().into(),
                description: "Insert transcript chunk rows. Call exactly once.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "rows": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "chunk_index": {"type": "integer"},
                                    "speaker": {"type": ["string", "null"]},
                                    "chunk_content": {"type": "string"},
                                },
                                "required": ["chunk_index", "chunk_content"],
                            }
                        }
                    },
                    "required": ["rows"],
                }),
            },
            WriteTool::InsertExtractedFacts => ToolDefinition {
                name: self.name().into(),
                description: "Insert extracted fact rows. Call exactly once.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "rows": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "fact_type": {
                                        "type": "string",
                                        "enum": FactType::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
                                    },
                                    "fact_content": {"type": "string"},
                                    "source_quote": {"type": "string"},
                                    "certainty": {"type": "integer", "minimum": 0, "maximum": 100},
                                    "speaker": {"type": ["string", "null"]},
                                },
                                "required": ["fact_type", "fact_content", "certainty"],
                            }
                        }
                    },
                    "required": ["rows"],
                }),
            },
            WriteTool::InsertInputs => ToolDefinition {
                name: self.name().into(),
                description: "Insert aggregated input rows. Call exactly once.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "rows": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "group_label": {"type": "string"},
                                    "input_content": {"type": "string"},
                                },
                                "required": ["group_label", "input_content"],
                            }
                        }
                    },
                    "required": ["rows"],
                }),
            },
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server-side validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fields the server fixes regardless of what the model supplied.
#[derive(Debug, Clone)]
pub struct FactContext {
    pub meeting_id: Uuid,
    pub source_chunk_id: Uuid,
    pub speaker: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validate model-supplied fact rows into [`ExtractedFact`]s.
///
/// Unknown `fact_type` falls back to `statement`, `certainty` is clamped
/// into 0..=100 (default 70), rows with empty `fact_content` are
/// dropped, and identity fields come from `ctx` alone.
pub fn validate_fact_rows(rows: &Value, ctx: &FactContext) -> Vec<ExtractedFact> {
    let Some(rows) = rows.as_array() else {
        return Vec::new();
    };

    let mut facts = Vec::new();
    for row in rows {
        let Some(row) = row.as_object() else {
            continue;
        };

        let fact_content = row
            .get("fact_content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if fact_content.is_empty() {
            continue;
        }

        let fact_type = row
            .get("fact_type")
            .and_then(Value::as_str)
            .map(FactType::parse_lenient)
            .unwrap_or(FactType::Statement);

        let certainty = row
            .get("certainty")
            .and_then(certainty_as_i64)
            .map(clamp_certainty)
            .unwrap_or(70);

        let speaker = row
            .get("speaker")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| ctx.speaker.clone());

        facts.push(ExtractedFact {
            id: Uuid::new_v4(),
            meeting_id: ctx.meeting_id,
            source_chunk_id: ctx.source_chunk_id,
            speaker,
            fact_type,
            fact_content: fact_content.to_string(),
            certainty,
            group_label: None,
            created_at: ctx.created_at,
        });
    }
    facts
}

/// Models emit certainty as integers, floats, or numeric strings.
fn certainty_as_i64(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    if let Some(f) = value.as_f64() {
        return Some(f as i64);
    }
    value.as_str().and_then(|s| s.trim().parse::<f64>().ok()).map(|f| f as i64)
}

/// Extract the fact rows out of an `insert_extracted_facts` tool call,
/// if that is what the call is.
pub fn fact_rows_from_tool_call(call: &ToolCall) -> Option<&Value> {
    if WriteTool::from_name(&call.name) != Some(WriteTool::InsertExtractedFacts) {
        return None;
    }
    call.arguments.get("rows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> FactContext {
        FactContext {
            meeting_id: Uuid::new_v4(),
            source_chunk_id: Uuid::new_v4(),
            speaker: Some("alice".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tool_names_round_trip() {
        for tool in [
            WriteTool::InsertTranscriptChunks,
            WriteTool::InsertExtractedFacts,
            WriteTool::InsertInputs,
        ] {
            assert_eq!(WriteTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(WriteTool::from_name("drop_table"), None);
    }

    #[test]
    fn valid_rows_become_facts() {
        let ctx = ctx();
        let rows = json!([
            {"fact_type": "decision", "fact_content": "Ship Friday", "certainty": 90},
            {"fact_type": "action", "fact_content": "Bob writes tests", "certainty": 80, "speaker": "bob"},
        ]);
        let facts = validate_fact_rows(&rows, &ctx);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].fact_type, FactType::Decision);
        assert_eq!(facts[0].meeting_id, ctx.meeting_id);
        assert_eq!(facts[0].speaker.as_deref(), Some("alice"), "context speaker fills the gap");
        assert_eq!(facts[1].speaker.as_deref(), Some("bob"));
        assert!(facts.iter().all(|f| f.group_label.is_none()));
    }

    #[test]
    fn identity_fields_are_server_fixed() {
        let ctx = ctx();
        let rows = json!([{
            "fact_type": "statement",
            "fact_content": "x",
            "certainty": 50,
            "meeting_id": "11111111-1111-1111-1111-111111111111",
            "source_chunk_id": "22222222-2222-2222-2222-222222222222",
        }]);
        let facts = validate_fact_rows(&rows, &ctx);
        assert_eq!(facts[0].meeting_id, ctx.meeting_id);
        assert_eq!(facts[0].source_chunk_id, ctx.source_chunk_id);
    }

    #[test]
    fn invalid_rows_are_normalized_or_dropped() {
        let rows = json!([
            {"fact_type": "opinion", "fact_content": "odd type", "certainty": 250},
            {"fact_type": "statement", "fact_content": "", "certainty": 50},
            {"fact_type": "statement", "fact_content": "stringy certainty", "certainty": "85"},
            "not an object",
        ]);
        let facts = validate_fact_rows(&rows, &ctx());
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].fact_type, FactType::Statement);
        assert_eq!(facts[0].certainty, 100);
        assert_eq!(facts[1].certainty, 85);
    }

    #[test]
    fn missing_certainty_defaults_to_70() {
        let rows = json!([{"fact_type": "statement", "fact_content": "x"}]);
        let facts = validate_fact_rows(&rows, &ctx());
        assert_eq!(facts[0].certainty, 70);
    }

    #[test]
    fn rows_from_matching_tool_call_only() {
        let call = ToolCall {
            id: "1".into(),
            name: "insert_extracted_facts".into(),
            arguments: json!({"rows": [{"fact_type": "statement", "fact_content": "x", "certainty": 1}]}),
        };
        assert!(fact_rows_from_tool_call(&call).is_some());

        let other = ToolCall {
            id: "2".into(),
            name: "insert_transcript_chunks".into(),
            arguments: json!({"rows": []}),
        };
        assert!(fact_rows_from_tool_call(&other).is_none());
    }
}
