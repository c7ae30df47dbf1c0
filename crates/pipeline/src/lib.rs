//! Transcript-to-input pipeline.
//!
//! Deterministic chunking, per-chunk LLM fact extraction (tool-calling
//! with a JSON fallback), cross-chunk grouping, and per-group
//! aggregation into synthesized input records. Stages run with bounded
//! parallelism and persist partial progress: a failed chunk contributes
//! zero facts, a failed group contributes no input, and re-running is
//! idempotent.

pub mod aggregator;
pub mod chunker;
pub mod extractor;
pub mod grouping;
pub mod run;
pub mod store;
pub mod tools;

pub use chunker::SmartChunker;
pub use run::{Pipeline, PipelineSummary};
pub use store::MeetingStore;
