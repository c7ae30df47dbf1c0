use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target chunk size in characters.
    #[serde(default = "d_2000")]
    pub max_chars: usize,
    /// Overlap carried between consecutive chunks.
    #[serde(default = "d_200")]
    pub overlap_chars: usize,
    /// Parallel chunk-extraction workers.
    #[serde(default = "d_4")]
    pub extract_workers: usize,
    /// Parallel group-aggregation workers.
    #[serde(default = "d_4")]
    pub aggregate_workers: usize,
    /// Facts per grouping LLM call.
    #[serde(default = "d_30")]
    pub max_facts_per_call: usize,
    /// Fact cap for the shortened fallback extraction prompt.
    #[serde(default = "d_12")]
    pub fallback_fact_cap: usize,
    /// Label applied when the model leaves a fact unlabeled.
    #[serde(default = "d_ungrouped")]
    pub default_group_label: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chars: d_2000(),
            overlap_chars: d_200(),
            extract_workers: d_4(),
            aggregate_workers: d_4(),
            max_facts_per_call: d_30(),
            fallback_fact_cap: d_12(),
            default_group_label: d_ungrouped(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_2000() -> usize {
    2000
}
fn d_200() -> usize {
    200
}
fn d_4() -> usize {
    4
}
fn d_30() -> usize {
    30
}
fn d_12() -> usize {
    12
}
fn d_ungrouped() -> String {
    "ungrouped".into()
}
