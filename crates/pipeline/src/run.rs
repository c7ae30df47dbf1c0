//! Pipeline orchestration: transcript text in, input records out.

use std::sync::Arc;

use uuid::Uuid;

use ms_domain::config::{LlmConfig, PipelineConfig};
use ms_domain::error::Result;
use ms_llm::types::LlmClient;
use ms_state::StatePaths;

use crate::aggregator::AggregatorNode;
use crate::chunker::SmartChunker;
use crate::extractor::ChunkExtractor;
use crate::grouping::GroupingNode;
use crate::store::MeetingStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub chunks: usize,
    pub facts: usize,
    pub groups: usize,
    pub inputs: usize,
}

/// The four-stage transcript pipeline.
///
/// Stages persist as they go, so a crashed or partially failed run can
/// be re-processed: chunking is skipped when chunks exist, extraction is
/// skipped when facts exist, grouping skips labeled facts, and
/// aggregation is skipped when inputs exist.
pub struct Pipeline {
    chunker: SmartChunker,
    extractor: ChunkExtractor,
    grouping: GroupingNode,
    aggregator: AggregatorNode,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LlmClient>, llm_cfg: &LlmConfig, pipeline_cfg: &PipelineConfig) -> Self {
        Self {
            chunker: SmartChunker::from_config(pipeline_cfg),
            extractor: ChunkExtractor::new(llm.clone(), llm_cfg, pipeline_cfg),
            grouping: GroupingNode::new(llm.clone(), llm_cfg, pipeline_cfg),
            aggregator: AggregatorNode::new(llm, llm_cfg, pipeline_cfg),
        }
    }

    /// Run all stages for one meeting transcript.
    pub async fn process_transcript(
        &self,
        paths: &StatePaths,
        meeting_id: Uuid,
        transcript_text: &str,
        source_label: &str,
    ) -> Result<PipelineSummary> {
        let store = MeetingStore::open(paths, meeting_id)?;

        // ── Stage 1: chunk ─────────────────────────────────────────
        if store.chunks().is_empty() {
            let chunks = self.chunker.chunk(meeting_id, transcript_text, source_label);
            store.insert_chunks(chunks)?;
        }
        let chunks = store.chunks();
        tracing::info!(meeting_id = %meeting_id, chunks = chunks.len(), "chunking done");

        if chunks.is_empty() {
            // Empty transcript: zero chunks, zero facts, zero inputs.
            return Ok(PipelineSummary {
                chunks: 0,
                facts: 0,
                groups: 0,
                inputs: 0,
            });
        }

        // ── Stage 2: extract facts (parallel) ──────────────────────
        if store.facts().is_empty() {
            self.extractor.run(&store, &chunks).await;
        }

        // ── Stage 3: group ─────────────────────────────────────────
        self.grouping.run(&store).await?;

        // ── Stage 4: aggregate (parallel) ──────────────────────────
        if store.inputs().is_empty() {
            self.aggregator.run(&store).await?;
        }

        let facts = store.facts();
        let groups = {
            let mut labels: Vec<_> = facts
                .iter()
                .filter_map(|f| f.group_label.clone())
                .collect();
            labels.sort();
            labels.dedup();
            labels.len()
        };

        Ok(PipelineSummary {
            chunks: chunks.len(),
            facts: facts.len(),
            groups,
            inputs: store.inputs().len(),
        })
    }
}
