//! Deterministic transcript chunking.
//!
//! No LLM involved: line endings are normalized, the text is walked in
//! windows of `max_chars`, and each cut point prefers the most natural
//! boundary available inside the window (paragraph, then line, then
//! sentence, then word). Consecutive chunks overlap by `overlap_chars`
//! so facts spanning a boundary are not lost.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use ms_domain::config::PipelineConfig;
use ms_domain::facts::TranscriptChunk;

/// Boundary preference, most natural first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// A boundary only counts when it keeps the chunk reasonably full
/// (otherwise tiny fragments accumulate).
const MIN_FILL_NUMERATOR: usize = 6;
const MIN_FILL_DENOMINATOR: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text splitting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split text into overlapping pieces of at most `max_chars` bytes,
/// cutting at the most natural boundary in each window. Empty pieces are
/// dropped. Identical input always yields identical output.
pub fn split_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return Vec::new();
    }

    let total = normalized.len();
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < total {
        let mut end = floor_char_boundary(normalized, (start + max_chars).min(total));

        if end < total {
            let window = &normalized[start..end];
            let min_fill = max_chars * MIN_FILL_NUMERATOR / MIN_FILL_DENOMINATOR;
            for sep in SEPARATORS {
                if let Some(pos) = window.rfind(sep) {
                    if pos >= min_fill {
                        end = start + pos + sep.len();
                        break;
                    }
                }
            }
        }

        let piece = normalized[start..end].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        if end >= total {
            break;
        }
        // Overlap with the previous chunk, but always make progress.
        let next = floor_char_boundary(normalized, end.saturating_sub(overlap_chars));
        start = next.max(start + 1);
    }

    pieces
}

/// Largest char boundary <= `index`.
fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Speaker inference
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The chunk's speaker, inferred only when exactly one distinct
/// `name:` prefix appears in it.
pub fn infer_single_speaker(content: &str) -> Option<String> {
    static SPEAKER_RE: OnceLock<Regex> = OnceLock::new();
    let re = SPEAKER_RE
        .get_or_init(|| Regex::new(r"(?m)^\s*([^:\n]{1,80})\s*:\s+").expect("valid literal regex"));
    let mut speakers: Vec<String> = Vec::new();
    for capture in re.captures_iter(content) {
        let name = capture[1].trim().to_string();
        if !name.is_empty() && !speakers.contains(&name) {
            speakers.push(name);
        }
    }
    match speakers.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chunker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SmartChunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl SmartChunker {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            max_chars: cfg.max_chars,
            overlap_chars: cfg.overlap_chars,
        }
    }

    /// Chunk a transcript into DB-shaped rows with 1-based indexes.
    pub fn chunk(
        &self,
        meeting_id: Uuid,
        transcript_text: &str,
        source_label: &str,
    ) -> Vec<TranscriptChunk> {
        let now = Utc::now();
        split_text(transcript_text, self.max_chars, self.overlap_chars)
            .into_iter()
            .enumerate()
            .map(|(i, content)| TranscriptChunk {
                id: Uuid::new_v4(),
                meeting_id,
                chunk_index: (i + 1) as u32,
                timestamp: now,
                speaker: infer_single_speaker(&content),
                content,
                source_label: source_label.to_string(),
            })
            .collect()
    }
}
