//! Per-chunk fact extraction.
//!
//! Primary mode presents the write tools and expects the model to call
//! them; when the provider rejects tool use, the model emits no call, or
//! the call doesn't validate, the node re-invokes in JSON-only mode, and
//! as a last resort retries once with a shorter prompt and a hard cap on
//! fact count. The invariant is "facts get persisted or the chunk yields
//! zero facts"; an extraction failure never crashes the pipeline.

use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use ms_domain::config::{LlmConfig, PipelineConfig};
use ms_domain::facts::{ExtractedFact, FactType, TranscriptChunk};
use ms_llm::types::{ChatMessage, ChatRequest, LlmClient};

use crate::store::MeetingStore;
use crate::tools::{fact_rows_from_tool_call, validate_fact_rows, FactContext, WriteTool};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extractor node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ChunkExtractor {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    max_tokens: u32,
    fallback_fact_cap: usize,
    workers: usize,
}

impl ChunkExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, llm_cfg: &LlmConfig, pipeline_cfg: &PipelineConfig) -> Self {
        Self {
            llm,
            temperature: llm_cfg.temperature,
            max_tokens: llm_cfg.extractor_max_tokens,
            fallback_fact_cap: pipeline_cfg.fallback_fact_cap,
            workers: pipeline_cfg.extract_workers,
        }
    }

    /// Extract facts from every chunk with bounded parallelism. Returns
    /// the total number of facts persisted.
    pub async fn run(&self, store: &MeetingStore, chunks: &[TranscriptChunk]) -> usize {
        let results: Vec<usize> = stream::iter(chunks.iter().cloned())
            .map(|chunk| async move { self.extract(store, &chunk).await })
            .buffer_unordered(self.workers.max(1))
            .collect()
            .await;
        results.into_iter().sum()
    }

    /// Extract facts from one chunk. Never fails; a chunk that defeats
    /// every mode yields zero facts.
    pub async fn extract(&self, store: &MeetingStore, chunk: &TranscriptChunk) -> usize {
        let ctx = FactContext {
            meeting_id: chunk.meeting_id,
            source_chunk_id: chunk.id,
            speaker: chunk.speaker.clone(),
            created_at: Utc::now(),
        };

        // ── Primary: tool calling ──────────────────────────────────
        match self.llm.chat(self.tool_request(chunk)).await {
            Ok(response) => {
                if let Some(rows) = response.tool_calls.iter().find_map(fact_rows_from_tool_call) {
                    let facts = validate_fact_rows(rows, &ctx);
                    if !facts.is_empty() || rows.as_array().map(|r| r.is_empty()).unwrap_or(false) {
                        return self.persist(store, chunk, facts);
                    }
                }
                tracing::debug!(
                    chunk_index = chunk.chunk_index,
                    "no usable tool call; falling back to JSON mode"
                );
            }
            Err(err) => {
                tracing::debug!(
                    chunk_index = chunk.chunk_index,
                    error = %err,
                    "tool-calling chat failed; falling back to JSON mode"
                );
            }
        }

        // ── Fallback 1: JSON-only mode ─────────────────────────────
        if let Some(facts) = self.json_attempt(&self.full_prompt(chunk), &ctx).await {
            return self.persist(store, chunk, facts);
        }

        // ── Fallback 2: shorter prompt, hard fact cap ──────────────
        if let Some(mut facts) = self.json_attempt(&self.short_prompt(chunk), &ctx).await {
            facts.truncate(self.fallback_fact_cap);
            return self.persist(store, chunk, facts);
        }

        tracing::warn!(
            chunk_index = chunk.chunk_index,
            "extraction failed in every mode; chunk yields zero facts"
        );
        0
    }

    fn persist(&self, store: &MeetingStore, chunk: &TranscriptChunk, facts: Vec<ExtractedFact>) -> usize {
        let count = facts.len();
        if let Err(err) = store.insert_facts(facts) {
            tracing::error!(chunk_index = chunk.chunk_index, error = %err, "fact persist failed");
            return 0;
        }
        tracing::info!(chunk_index = chunk.chunk_index, facts = count, "chunk extracted");
        count
    }

    async fn json_attempt(&self, user_prompt: &str, ctx: &FactContext) -> Option<Vec<ExtractedFact>> {
        let request = ChatRequest {
            messages: vec![ChatMessage::system(SYSTEM_JSON), ChatMessage::user(user_prompt)],
            tools: Vec::new(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            json_mode: true,
        };
        let response = match self.llm.chat(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "JSON-mode chat failed");
                return None;
            }
        };
        let payload = recover_json(&response.content)?;
        let rows = payload.get("facts")?;
        Some(validate_fact_rows(rows, ctx))
    }

    // ── Prompts ────────────────────────────────────────────────────

    fn tool_request(&self, chunk: &TranscriptChunk) -> ChatRequest {
        ChatRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_TOOLS),
                ChatMessage::user(self.full_prompt(chunk)),
            ],
            tools: vec![
                WriteTool::InsertTranscriptChunks.definition(),
                WriteTool::InsertExtractedFacts.definition(),
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            json_mode: false,
        }
    }

    fn full_prompt(&self, chunk: &TranscriptChunk) -> String {
        let schema_hint = serde_json::json!({
            "facts": [{
                "fact_type": format!(
                    "one of: {}",
                    FactType::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
                ),
                "fact_content": "string (atomic fact)",
                "source_quote": "string (short exact quote from the chunk)",
                "certainty": "integer 0..100",
            }]
        });

        format!(
            "Extract facts from the following transcript chunk.\n\
             Rules:\n\
             - Facts must be specific and independently true.\n\
             - Prefer actions, decisions, constraints, questions, reminders.\n\
             - fact_type MUST be one of the allowed enum values.\n\
             - Use a short direct quote as evidence when possible.\n\
             - certainty is an integer 0..100 (higher means more confident).\n\
             - If nothing meaningful, return {{\"facts\": []}}.\n\n\
             Chunk:\n{}\n\n\
             Return JSON matching this shape:\n{}",
            chunk.content, schema_hint
        )
    }

    fn short_prompt(&self, chunk: &TranscriptChunk) -> String {
        format!(
            "Extract at most {} atomic facts from this transcript chunk as JSON \
             {{\"facts\": [{{\"fact_type\", \"fact_content\", \"certainty\"}}]}}.\n\n{}",
            self.fallback_fact_cap, chunk.content
        )
    }
}

const SYSTEM_TOOLS: &str = "You are a precise information extraction system. \
    Extract actionable, atomic facts from meeting transcript text. \
    Persist your results by calling the provided tools: call \
    insert_transcript_chunks once with the chunk row, then \
    insert_extracted_facts once with the extracted fact rows.";

const SYSTEM_JSON: &str = "You are a precise information extraction system. \
    Extract actionable, atomic facts from meeting transcript text. \
    Return ONLY valid JSON, no extra text.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resilient JSON recovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Recover a JSON object from messy model output: strips markdown
/// fences, then falls back to the first balanced `{...}` in the text.
pub fn recover_json(text: &str) -> Option<Value> {
    let mut s = text.trim();
    if let Some(stripped) = s.strip_prefix("```") {
        // Drop the fence line (possibly "```json") and the closing fence.
        s = stripped.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        if let Some(idx) = s.rfind("```") {
            s = &s[..idx];
        }
        s = s.trim();
    }

    if let Ok(value) = serde_json::from_str::<Value>(s) {
        if value.is_object() {
            return Some(value);
        }
    }

    first_balanced_object(s).and_then(|candidate| serde_json::from_str(candidate).ok())
}

/// The first `{...}` with balanced braces, brace characters inside
/// string literals ignored.
fn first_balanced_object(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_domain::error::{Error, Result};
    use ms_state::StatePaths;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use uuid::Uuid;

    // ── Fake LLM ───────────────────────────────────────────────────

    struct FakeLlm {
        responses: Mutex<VecDeque<Result<ms_llm::ChatResponse>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeLlm {
        fn new(responses: Vec<Result<ms_llm::ChatResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn text(content: &str) -> ms_llm::ChatResponse {
            ms_llm::ChatResponse {
                content: content.into(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".into()),
            }
        }

        fn tool_call(rows: Value) -> ms_llm::ChatResponse {
            ms_llm::ChatResponse {
                content: String::new(),
                tool_calls: vec![ms_llm::ToolCall {
                    id: "call_1".into(),
                    name: "insert_extracted_facts".into(),
                    arguments: json!({ "rows": rows }),
                }],
                finish_reason: Some("tool_calls".into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for FakeLlm {
        async fn chat(&self, req: ChatRequest) -> Result<ms_llm::ChatResponse> {
            self.requests.lock().push(req);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Llm("script exhausted".into())))
        }
    }

    fn fixture(dir: &tempfile::TempDir) -> (MeetingStore, TranscriptChunk) {
        let paths = StatePaths::new(dir.path());
        let meeting_id = Uuid::new_v4();
        let store = MeetingStore::open(&paths, meeting_id).unwrap();
        let chunk = TranscriptChunk {
            id: Uuid::new_v4(),
            meeting_id,
            chunk_index: 1,
            timestamp: Utc::now(),
            speaker: Some("alice".into()),
            content: "alice: ship friday. bob will write the tests.".into(),
            source_label: "google_meet".into(),
        };
        (store, chunk)
    }

    fn extractor(llm: Arc<FakeLlm>) -> ChunkExtractor {
        ChunkExtractor {
            llm,
            temperature: 0.2,
            max_tokens: 400,
            fallback_fact_cap: 12,
            workers: 4,
        }
    }

    #[tokio::test]
    async fn tool_call_mode_persists_facts() {
        let llm = FakeLlm::new(vec![Ok(FakeLlm::tool_call(json!([
            {"fact_type": "decision", "fact_content": "Ship Friday", "certainty": 90},
            {"fact_type": "action", "fact_content": "Bob writes tests", "certainty": 85},
        ])))]);
        let dir = tempfile::tempdir().unwrap();
        let (store, chunk) = fixture(&dir);

        let count = extractor(llm.clone()).extract(&store, &chunk).await;
        assert_eq!(count, 2);
        assert_eq!(store.facts().len(), 2);
        // Only one request: the tool-mode call succeeded.
        assert_eq!(llm.requests.lock().len(), 1);
        assert!(!llm.requests.lock()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn provider_tool_rejection_falls_back_to_json() {
        let llm = FakeLlm::new(vec![
            Err(Error::Llm("tool_use_failed".into())),
            Ok(FakeLlm::text(
                r#"{"facts": [{"fact_type": "action", "fact_content": "Bob writes tests", "certainty": 80}]}"#,
            )),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let (store, chunk) = fixture(&dir);

        let count = extractor(llm.clone()).extract(&store, &chunk).await;
        assert_eq!(count, 1);

        let requests = llm.requests.lock();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].tools.is_empty());
        assert!(requests[1].json_mode);
    }

    #[tokio::test]
    async fn missing_tool_call_falls_back_to_json() {
        let llm = FakeLlm::new(vec![
            Ok(FakeLlm::text("I would extract facts but I won't call tools.")),
            Ok(FakeLlm::text(
                "```json\n{\"facts\": [{\"fact_type\": \"statement\", \"fact_content\": \"fenced\", \"certainty\": 60}]}\n```",
            )),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let (store, chunk) = fixture(&dir);

        let count = extractor(llm).extract(&store, &chunk).await;
        assert_eq!(count, 1);
        assert_eq!(store.facts()[0].fact_content, "fenced");
    }

    #[tokio::test]
    async fn second_fallback_caps_fact_count() {
        let many: Vec<Value> = (0..20)
            .map(|i| json!({"fact_type": "statement", "fact_content": format!("fact {i}"), "certainty": 50}))
            .collect();
        let llm = FakeLlm::new(vec![
            Err(Error::Llm("tool_use_failed".into())),
            Err(Error::Llm("bad json".into())),
            Ok(FakeLlm::text(&json!({ "facts": many }).to_string())),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let (store, chunk) = fixture(&dir);

        let count = extractor(llm).extract(&store, &chunk).await;
        assert_eq!(count, 12, "second fallback caps at 12 facts");
    }

    #[tokio::test]
    async fn total_failure_yields_zero_facts_without_crashing() {
        let llm = FakeLlm::new(vec![
            Err(Error::Llm("tool_use_failed".into())),
            Ok(FakeLlm::text("not json at all")),
            Ok(FakeLlm::text("still not json")),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let (store, chunk) = fixture(&dir);

        let count = extractor(llm).extract(&store, &chunk).await;
        assert_eq!(count, 0);
        assert!(store.facts().is_empty());
    }

    #[tokio::test]
    async fn empty_tool_rows_is_a_valid_zero_fact_outcome() {
        let llm = FakeLlm::new(vec![Ok(FakeLlm::tool_call(json!([])))]);
        let dir = tempfile::tempdir().unwrap();
        let (store, chunk) = fixture(&dir);

        let count = extractor(llm.clone()).extract(&store, &chunk).await;
        assert_eq!(count, 0);
        // No fallback: the model legitimately found nothing.
        assert_eq!(llm.requests.lock().len(), 1);
    }

    // ── recover_json ───────────────────────────────────────────────

    #[test]
    fn recovers_plain_and_fenced_json() {
        assert!(recover_json(r#"{"facts": []}"#).is_some());
        assert!(recover_json("```json\n{\"facts\": []}\n```").is_some());
        assert!(recover_json("```\n{\"facts\": []}\n```").is_some());
    }

    #[test]
    fn recovers_embedded_object() {
        let text = "Here you go: {\"facts\": [{\"fact_content\": \"x with } brace\", \"fact_type\": \"statement\", \"certainty\": 50}]} hope that helps";
        let value = recover_json(text).unwrap();
        assert_eq!(value["facts"][0]["fact_content"], "x with } brace");
    }

    #[test]
    fn garbage_returns_none() {
        assert!(recover_json("no braces here").is_none());
        assert!(recover_json("{unbalanced").is_none());
        assert!(recover_json("").is_none());
    }
}
