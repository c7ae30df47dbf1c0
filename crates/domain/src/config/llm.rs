use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One OpenAI-compatible chat endpoint shared by all pipeline nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Env var holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds.
    #[serde(default = "d_60")]
    pub timeout_seconds: u64,
    /// Retries for transient failures (429/5xx/timeouts).
    #[serde(default = "d_6")]
    pub max_attempts: u32,
    /// Sampling temperature. Pipeline nodes expect <= 0.2.
    #[serde(default = "d_temp")]
    pub temperature: f32,
    /// Sliding-window requests-per-minute cap.
    #[serde(default = "d_rpm")]
    pub rpm_limit: u32,
    /// Sliding-window estimated-tokens-per-minute cap.
    #[serde(default = "d_tpm")]
    pub tpm_limit: u32,

    // ── Per-node output budgets ────────────────────────────────────
    #[serde(default = "d_400")]
    pub extractor_max_tokens: u32,
    #[serde(default = "d_600")]
    pub grouping_max_tokens: u32,
    #[serde(default = "d_900")]
    pub aggregator_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            timeout_seconds: d_60(),
            max_attempts: d_6(),
            temperature: d_temp(),
            rpm_limit: d_rpm(),
            tpm_limit: d_tpm(),
            extractor_max_tokens: d_400(),
            grouping_max_tokens: d_600(),
            aggregator_max_tokens: d_900(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn d_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn d_api_key_env() -> String {
    "MEETSCRIBE_LLM_KEY".into()
}
fn d_60() -> u64 {
    60
}
fn d_6() -> u32 {
    6
}
fn d_temp() -> f32 {
    0.2
}
fn d_rpm() -> u32 {
    25
}
fn d_tpm() -> u32 {
    6000
}
fn d_400() -> u32 {
    400
}
fn d_600() -> u32 {
    600
}
fn d_900() -> u32 {
    900
}
