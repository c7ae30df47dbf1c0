//! Cross-chunk fact grouping.
//!
//! Facts whose `group_label` is null are sent to the model in batches;
//! the model assigns each a thematic label, and server-side
//! normalization guarantees the stored label always matches
//! `[a-z0-9_-]{1,100}`. Re-running skips already-labeled facts.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use ms_domain::config::{LlmConfig, PipelineConfig};
use ms_domain::error::{Error, Result};
use ms_domain::facts::ExtractedFact;
use ms_llm::types::{ChatMessage, ChatRequest, LlmClient};

use crate::extractor::recover_json;
use crate::store::MeetingStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Label normalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Normalize a model-supplied group label.
///
/// Lowercase, whitespace runs to a single `_`, strip anything outside
/// `[a-z0-9_-]`, truncate to 100 chars. A label that ends up not
/// starting and ending on an alphanumeric gets a second cleanup pass
/// (collapse `_` runs, trim edge `_`/`-`); a valid label is stored
/// exactly as produced. Empty results become `default`. Idempotent.
pub fn normalize_group_label(label: &str, default: &str) -> String {
    let lowered = label.trim().to_lowercase();

    let mut s = String::with_capacity(lowered.len());
    let mut in_whitespace = false;
    for c in lowered.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                s.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
            s.push(c);
        }
    }
    let mut s: String = s.chars().take(100).collect();

    if s.is_empty() {
        return default.to_string();
    }

    // Fallback cleanup, only for labels that fail the stored-form check.
    if !has_alphanumeric_edges(&s) {
        while s.contains("__") {
            s = s.replace("__", "_");
        }
        s = s
            .trim_matches(|c| c == '_' || c == '-')
            .chars()
            .take(100)
            .collect();
        if s.is_empty() {
            return default.to_string();
        }
    }
    s
}

/// The stored form starts and ends on `[a-z0-9]` (interior characters
/// are already confined to the label alphabet by construction).
fn has_alphanumeric_edges(s: &str) -> bool {
    let edge_ok = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    match (s.chars().next(), s.chars().last()) {
        (Some(first), Some(last)) => edge_ok(first) && edge_ok(last),
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Grouping node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GroupingNode {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    max_tokens: u32,
    max_facts_per_call: usize,
    default_label: String,
}

impl GroupingNode {
    pub fn new(llm: Arc<dyn LlmClient>, llm_cfg: &LlmConfig, pipeline_cfg: &PipelineConfig) -> Self {
        Self {
            llm,
            temperature: llm_cfg.temperature,
            max_tokens: llm_cfg.grouping_max_tokens,
            max_facts_per_call: pipeline_cfg.max_facts_per_call.max(1),
            default_label: normalize_group_label(&pipeline_cfg.default_group_label, "ungrouped"),
        }
    }

    /// Label every unlabeled fact for the meeting. Returns the number of
    /// facts labeled; a second run over the same facts is a no-op.
    pub async fn run(&self, store: &MeetingStore) -> Result<usize> {
        let unlabeled = store.unlabeled_facts();
        if unlabeled.is_empty() {
            return Ok(0);
        }

        let mut labeled = 0;
        for batch in unlabeled.chunks(self.max_facts_per_call) {
            let by_index = self.label_batch(store.meeting_id(), batch).await?;
            let updates: Vec<(Uuid, String)> = batch
                .iter()
                .enumerate()
                .map(|(i, fact)| {
                    let label = by_index
                        .get(&i)
                        .cloned()
                        .unwrap_or_else(|| self.default_label.clone());
                    (fact.id, label)
                })
                .collect();
            labeled += store.set_group_labels(&updates)?;
        }

        tracing::info!(labeled, "grouping complete");
        Ok(labeled)
    }

    /// One LLM call labeling up to `max_facts_per_call` facts.
    async fn label_batch(
        &self,
        meeting_id: Uuid,
        batch: &[ExtractedFact],
    ) -> Result<HashMap<usize, String>> {
        let items: Vec<Value> = batch
            .iter()
            .enumerate()
            .map(|(i, fact)| {
                serde_json::json!({
                    "i": i,
                    "fact_type": fact.fact_type.as_str(),
                    "speaker": fact.speaker,
                    "fact_content": fact.fact_content,
                })
            })
            .collect();

        let schema_hint = serde_json::json!({
            "labels": [{"i": 0, "group_label": "string (<=100 chars, lowercase, underscores)"}]
        });
        let user = format!(
            "Assign a group_label to each fact.\n\
             Rules:\n\
             - group_label MUST be <= 100 characters.\n\
             - Use lowercase and underscores only.\n\
             - Prefer stable labels like: action_items, decisions, open_questions, \
               constraints, risks, next_steps, proposals, agreements, disagreements, reminders.\n\
             - Facts that clearly belong together should share the same group_label.\n\
             - If unsure, use group_label=\"{}\".\n\n\
             meeting_id: {meeting_id}\n\
             facts: {}\n\n\
             Return JSON matching this shape: {schema_hint}",
            self.default_label,
            serde_json::to_string(&items)?,
        );

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You are a semantic grouping system. Given extracted meeting facts, \
                     assign a concise group_label to each fact. Return ONLY valid JSON.",
                ),
                ChatMessage::user(user),
            ],
            tools: Vec::new(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            json_mode: true,
        };

        let response = self.llm.chat(request).await?;
        let payload = recover_json(&response.content)
            .ok_or_else(|| Error::Llm("grouping response is not JSON".into()))?;
        let labels = payload
            .get("labels")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Llm("grouping JSON must include a 'labels' list".into()))?;

        let mut by_index = HashMap::new();
        for item in labels {
            let Some(i) = item.get("i").and_then(Value::as_u64) else {
                continue;
            };
            let Some(label) = item.get("group_label").and_then(Value::as_str) else {
                continue;
            };
            let i = i as usize;
            if i < batch.len() {
                by_index.insert(i, normalize_group_label(label, &self.default_label));
            }
        }
        Ok(by_index)
    }
}
