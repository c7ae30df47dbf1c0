//! Per-group aggregation.
//!
//! The router partitions labeled facts by `group_label`; one LLM call
//! per group synthesizes a deduplicated, conflict-resolved
//! `input_content`. Groups aggregate in parallel with bounded workers; a
//! failed group contributes no input and does not fail its siblings.
//! Outputs are ordered by label for deterministic downstream behavior.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use ms_domain::config::{LlmConfig, PipelineConfig};
use ms_domain::error::{Error, Result};
use ms_domain::facts::{ExtractedFact, InputRecord};
use ms_llm::types::{ChatMessage, ChatRequest, LlmClient};

use crate::extractor::recover_json;
use crate::store::MeetingStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Partition facts by group label. Unlabeled facts land under
/// `default_label` (they only occur when grouping was skipped). The
/// BTreeMap keeps group order deterministic.
pub fn route_by_group(
    facts: Vec<ExtractedFact>,
    default_label: &str,
) -> BTreeMap<String, Vec<ExtractedFact>> {
    let mut groups: BTreeMap<String, Vec<ExtractedFact>> = BTreeMap::new();
    for fact in facts {
        let label = fact
            .group_label
            .clone()
            .unwrap_or_else(|| default_label.to_string());
        groups.entry(label).or_default().push(fact);
    }
    groups
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregator node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AggregatorNode {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    max_tokens: u32,
    workers: usize,
    default_label: String,
}

impl AggregatorNode {
    pub fn new(llm: Arc<dyn LlmClient>, llm_cfg: &LlmConfig, pipeline_cfg: &PipelineConfig) -> Self {
        Self {
            llm,
            temperature: llm_cfg.temperature,
            max_tokens: llm_cfg.aggregator_max_tokens,
            workers: pipeline_cfg.aggregate_workers.max(1),
            default_label: pipeline_cfg.default_group_label.clone(),
        }
    }

    /// Aggregate every group into one input record and persist the lot,
    /// ordered by group label. Returns the number of inputs written.
    pub async fn run(&self, store: &MeetingStore) -> Result<usize> {
        let groups = route_by_group(store.facts(), &self.default_label);
        if groups.is_empty() {
            return Ok(0);
        }

        let meeting_id = store.meeting_id();
        let outcomes: Vec<Option<InputRecord>> = stream::iter(groups.into_iter())
            .map(|(label, facts)| async move {
                match self.aggregate_group(meeting_id, &label, &facts).await {
                    Ok(record) => record,
                    Err(err) => {
                        tracing::warn!(group_label = %label, error = %err, "group aggregation failed");
                        None
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut records: Vec<InputRecord> = outcomes.into_iter().flatten().collect();
        records.sort_by(|a, b| a.group_label.cmp(&b.group_label));
        let written = store.insert_inputs(records)?;
        tracing::info!(inputs = written, "aggregation complete");
        Ok(written)
    }

    /// One LLM call for one group. `Ok(None)` when the model produced an
    /// empty synthesis.
    async fn aggregate_group(
        &self,
        meeting_id: Uuid,
        group_label: &str,
        facts: &[ExtractedFact],
    ) -> Result<Option<InputRecord>> {
        let items: Vec<Value> = facts
            .iter()
            .map(|fact| {
                serde_json::json!({
                    "fact_type": fact.fact_type.as_str(),
                    "speaker": fact.speaker,
                    "certainty": fact.certainty,
                    "fact_content": fact.fact_content,
                })
            })
            .collect();

        let user = format!(
            "Synthesize the following meeting facts into a single resolved input_content.\n\
             Rules:\n\
             - Remove duplicates and near-duplicates.\n\
             - Resolve conflicts: if facts contradict, prefer the higher certainty or \
               phrase uncertainty explicitly.\n\
             - Keep it actionable and concise.\n\
             - Use bullet points when it improves clarity.\n\
             - Do not invent details not present in the facts.\n\n\
             meeting_id: {meeting_id}\n\
             group_label: {group_label}\n\
             facts: {}\n\n\
             Return JSON matching this shape: {{\"input_content\": \"string\"}}",
            serde_json::to_string(&items)?,
        );

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You are a meeting synthesis system. Given extracted facts of a single \
                     theme/group, produce a clean, conflict-resolved summary. \
                     Return ONLY valid JSON.",
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
            .ok_or_else(|| Error::Llm("aggregation response is not JSON".into()))?;
        let content = payload
            .get("input_content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();

        if content.is_empty() {
            return Ok(None);
        }

        Ok(Some(InputRecord {
            id: Uuid::new_v4(),
            meeting_id,
            group_label: group_label.to_string(),
            input_content: content.to_string(),
            created_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ms_domain::facts::FactType;
    use ms_state::StatePaths;
    use parking_lot::Mutex;

    fn fact(meeting_id: Uuid, label: &str, content: &str) -> ExtractedFact {
        ExtractedFact {
            id: Uuid::new_v4(),
            meeting_id,
            source_chunk_id: Uuid::new_v4(),
            speaker: None,
            fact_type: FactType::Statement,
            fact_content: content.into(),
            certainty: 70,
            group_label: Some(label.into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn router_partitions_and_orders() {
        let meeting_id = Uuid::new_v4();
        let facts = vec![
            fact(meeting_id, "risks", "r1"),
            fact(meeting_id, "decisions", "d1"),
            fact(meeting_id, "risks", "r2"),
        ];
        let groups = route_by_group(facts, "ungrouped");
        let labels: Vec<&str> = groups.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["decisions", "risks"]);
        assert_eq!(groups["risks"].len(), 2);
    }

    #[test]
    fn router_defaults_unlabeled() {
        let meeting_id = Uuid::new_v4();
        let mut unlabeled = fact(meeting_id, "x", "c");
        unlabeled.group_label = None;
        let groups = route_by_group(vec![unlabeled], "ungrouped");
        assert!(groups.contains_key("ungrouped"));
    }

    // ── Node tests ─────────────────────────────────────────────────

    /// Answers each group with a synthesis echoing the group label;
    /// groups named in `fail` error out instead.
    struct GroupEcho {
        fail: Vec<String>,
        calls: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl LlmClient for GroupEcho {
        async fn chat(&self, req: ChatRequest) -> ms_domain::error::Result<ms_llm::ChatResponse> {
            *self.calls.lock() += 1;
            let user = &req.messages.last().unwrap().content;
            let label = user
                .lines()
                .find_map(|l| l.strip_prefix("group_label: "))
                .unwrap_or("?")
                .to_string();
            if self.fail.contains(&label) {
                return Err(Error::Llm("boom".into()));
            }
            Ok(ms_llm::ChatResponse {
                content: format!(r#"{{"input_content": "synthesis for {label}"}}"#),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".into()),
            })
        }
    }

    fn store_with_groups(dir: &tempfile::TempDir, labels: &[&str]) -> MeetingStore {
        let paths = StatePaths::new(dir.path());
        let meeting_id = Uuid::new_v4();
        let store = MeetingStore::open(&paths, meeting_id).unwrap();
        let facts: Vec<ExtractedFact> = labels
            .iter()
            .map(|label| fact(meeting_id, label, &format!("content for {label}")))
            .collect();
        store.insert_facts(facts).unwrap();
        store
    }

    fn node(llm: Arc<GroupEcho>) -> AggregatorNode {
        AggregatorNode {
            llm,
            temperature: 0.2,
            max_tokens: 900,
            workers: 4,
            default_label: "ungrouped".into(),
        }
    }

    #[tokio::test]
    async fn one_input_per_group_sorted_by_label() {
        let llm = Arc::new(GroupEcho {
            fail: Vec::new(),
            calls: Mutex::new(0),
        });
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_groups(&dir, &["risks", "decisions", "risks", "actions"]);

        let written = node(llm.clone()).run(&store).await.unwrap();
        assert_eq!(written, 3, "one input per distinct group");
        assert_eq!(*llm.calls.lock(), 3);

        let labels: Vec<String> = store.inputs().into_iter().map(|i| i.group_label).collect();
        assert_eq!(labels, vec!["actions", "decisions", "risks"]);
        assert!(store.inputs()[0]
            .input_content
            .contains("synthesis for actions"));
    }

    #[tokio::test]
    async fn failed_group_does_not_fail_siblings() {
        let llm = Arc::new(GroupEcho {
            fail: vec!["decisions".into()],
            calls: Mutex::new(0),
        });
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_groups(&dir, &["decisions", "risks"]);

        let written = node(llm).run(&store).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.inputs()[0].group_label, "risks");
    }

    #[tokio::test]
    async fn empty_store_writes_nothing() {
        let llm = Arc::new(GroupEcho {
            fail: Vec::new(),
            calls: Mutex::new(0),
        });
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::new(dir.path());
        let store = MeetingStore::open(&paths, Uuid::new_v4()).unwrap();

        let written = node(llm.clone()).run(&store).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(*llm.calls.lock(), 0);
    }
}
