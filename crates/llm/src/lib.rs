//! LLM access for the transcript pipeline.
//!
//! One OpenAI-compatible chat adapter covers every node (extraction,
//! grouping, aggregation); all calls flow through a process-global
//! sliding-window rate limiter so parallel workers can't induce 429
//! storms.

pub mod limiter;
pub mod openai_compat;
pub mod types;

pub use limiter::RateLimiter;
pub use openai_compat::OpenAiCompatClient;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, LlmClient, Role, ToolCall, ToolDefinition,
};
