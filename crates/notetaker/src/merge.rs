//! Transcript fragment merging.
//!
//! A meeting with rejoins leaves one transcript fragment per bot id.
//! Merging normalizes every fragment into flat entries, orders them
//! deterministically, marks recording gaps, and writes one JSON + one
//! text output. Fragments are never mutated; the operation is
//! idempotent unless forced.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ms_domain::error::Result;
use ms_domain::meeting::Occurrence;
use ms_state::{atomic, StatePaths};

pub const MERGE_MARKER_TEXT: &str = "[Recording resumed after disconnection]";

/// Gap between consecutive timestamped entries that implies a dropped
/// recording, in seconds.
const GAP_SECONDS: f64 = 30.0;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedEntry {
    pub speaker: Option<String>,
    pub text: String,
    pub timestamp: Option<f64>,
    pub bot_id: String,
    pub segment_index: i64,
}

#[derive(Debug, Serialize)]
struct MergedPayload {
    object: &'static str,
    meeting_key: MeetingKey,
    source_files: Vec<String>,
    entries: Vec<MergedEntry>,
}

#[derive(Debug, Serialize)]
struct MeetingKey {
    event_id: String,
    event_start: String,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub json_path: PathBuf,
    pub txt_path: PathBuf,
    /// False when existing outputs were reused (no `force`).
    pub performed: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry points
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Merge all fragments for one occurrence.
///
/// Returns `None` when no fragments exist.
pub fn merge_transcripts(
    paths: &StatePaths,
    occurrence: &Occurrence,
    force: bool,
) -> Result<Option<MergeOutcome>> {
    merge_by_key(paths, &occurrence.event_id, &occurrence.safe_start(), force)
}

/// Merge every occurrence found in the transcripts directory. Useful
/// when transcripts arrive late or out of order.
pub fn merge_all(paths: &StatePaths, force: bool) -> Result<Vec<MergeOutcome>> {
    let dir = paths.transcripts_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Ok(Vec::new());
    };

    let mut keys: Vec<(String, String)> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some((event_id, start_token, _)) = parse_fragment_name(&name) {
            let key = (event_id, start_token);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys.sort();

    let mut merged = Vec::new();
    for (event_id, start_token) in keys {
        if let Some(outcome) = merge_by_key(paths, &event_id, &start_token, force)? {
            merged.push(outcome);
        }
    }
    Ok(merged)
}

fn merge_by_key(
    paths: &StatePaths,
    event_id: &str,
    start_token: &str,
    force: bool,
) -> Result<Option<MergeOutcome>> {
    let dir = paths.transcripts_dir();
    let files = list_fragments(&dir, event_id, start_token);
    if files.is_empty() {
        return Ok(None);
    }

    let json_path = dir.join(format!("{event_id}__{start_token}__MERGED.transcript.json"));
    let txt_path = dir.join(format!("{event_id}__{start_token}__MERGED.txt"));

    if !force && json_path.exists() && txt_path.exists() {
        return Ok(Some(MergeOutcome {
            json_path,
            txt_path,
            performed: false,
        }));
    }

    let mut entries: Vec<MergedEntry> = Vec::new();
    for (file_index, path) in files.iter().enumerate() {
        let bot_id = parse_fragment_name(&path.file_name().unwrap_or_default().to_string_lossy())
            .map(|(_, _, bot)| bot)
            .unwrap_or_else(|| "unknown".to_string());
        let raw = std::fs::read_to_string(path)?;
        let payload: Value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));

        // Fragment segment indexes restart at 0; offset per file so
        // ordering between untimestamped fragments follows file order.
        for (i, mut entry) in normalize_payload(&payload, &bot_id).into_iter().enumerate() {
            entry.segment_index = (file_index as i64) * 1_000_000 + i as i64;
            entries.push(entry);
        }
    }

    sort_entries(&mut entries);
    let entries = insert_gap_markers(entries);

    let payload = MergedPayload {
        object: "merged_transcript",
        meeting_key: MeetingKey {
            event_id: event_id.to_string(),
            event_start: start_token.to_string(),
        },
        source_files: files
            .iter()
            .map(|p| p.file_name().unwrap_or_default().to_string_lossy().into_owned())
            .collect(),
        entries: entries.clone(),
    };

    atomic::write_json(&json_path, &payload)?;
    atomic::write_text(&txt_path, &render_text(&entries))?;

    tracing::info!(
        event_id,
        fragments = files.len(),
        entries = entries.len(),
        "merged transcript written"
    );

    Ok(Some(MergeOutcome {
        json_path,
        txt_path,
        performed: true,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fragment discovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `<event_id>__<start_token>__<bot_id>.transcript.json`
fn parse_fragment_name(name: &str) -> Option<(String, String, String)> {
    let stem = name.strip_suffix(".transcript.json")?;
    if stem.contains("__MERGED") {
        return None;
    }
    let mut parts = stem.splitn(3, "__");
    let event_id = parts.next()?;
    let start_token = parts.next()?;
    let bot_id = parts.next()?;
    if event_id.is_empty() || start_token.is_empty() || bot_id.is_empty() {
        return None;
    }
    Some((event_id.into(), start_token.into(), bot_id.into()))
}

fn list_fragments(dir: &Path, event_id: &str, start_token: &str) -> Vec<PathBuf> {
    let prefix = format!("{event_id}__{start_token}__");
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = p.file_name().unwrap_or_default().to_string_lossy().into_owned();
            name.starts_with(&prefix) && parse_fragment_name(&name).is_some()
        })
        .collect();

    // Deterministic file order: modification time, then name.
    files.sort_by_key(|p| {
        let mtime = p
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        (mtime, p.file_name().unwrap_or_default().to_os_string())
    });
    files
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Normalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn coerce_timestamp(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

fn clean_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Flatten one fragment payload into entries.
///
/// Handles the provider's `speaker_labelled` and `raw` shapes plus
/// best-effort fallbacks (bare segment object, segment list, raw
/// string).
pub fn normalize_payload(payload: &Value, bot_id: &str) -> Vec<MergedEntry> {
    let mut out = Vec::new();
    let mut push = |speaker: Option<String>, text: String, timestamp: Option<f64>| {
        let segment_index = out.len() as i64;
        out.push(MergedEntry {
            speaker,
            text,
            timestamp,
            bot_id: bot_id.to_string(),
            segment_index,
        });
    };

    match payload {
        Value::Object(obj) => {
            let kind = obj.get("type").and_then(Value::as_str);
            match (kind, obj.get("transcript")) {
                (Some("speaker_labelled"), Some(Value::Array(items))) => {
                    for item in items {
                        let Some(text) = clean_str(item.get("text")) else {
                            continue;
                        };
                        push(
                            clean_str(item.get("speaker")),
                            text,
                            coerce_timestamp(item.get("start")),
                        );
                    }
                }
                (Some("raw"), Some(Value::String(body))) => {
                    let body = body.trim();
                    if !body.is_empty() {
                        push(None, body.to_string(), None);
                    }
                }
                _ => {
                    // A bare segment-shaped object.
                    if let Some(text) = clean_str(obj.get("text")) {
                        let ts = coerce_timestamp(obj.get("start_time"))
                            .or_else(|| coerce_timestamp(obj.get("timestamp")))
                            .or_else(|| coerce_timestamp(obj.get("start")));
                        push(clean_str(obj.get("speaker")), text, ts);
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(seg) => {
                        let Some(text) = clean_str(seg.get("text")) else {
                            continue;
                        };
                        let ts = coerce_timestamp(seg.get("start_time"))
                            .or_else(|| coerce_timestamp(seg.get("timestamp")))
                            .or_else(|| coerce_timestamp(seg.get("start")));
                        push(clean_str(seg.get("speaker")), text, ts);
                    }
                    Value::String(s) if !s.trim().is_empty() => {
                        push(None, s.trim().to_string(), None);
                    }
                    _ => {}
                }
            }
        }
        Value::String(s) if !s.trim().is_empty() => {
            push(None, s.trim().to_string(), None);
        }
        _ => {}
    }

    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ordering + gap markers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn sort_entries(entries: &mut [MergedEntry]) {
    entries.sort_by(|a, b| {
        let has_a = u8::from(a.timestamp.is_none());
        let has_b = u8::from(b.timestamp.is_none());
        has_a
            .cmp(&has_b)
            .then_with(|| {
                a.timestamp
                    .unwrap_or(0.0)
                    .total_cmp(&b.timestamp.unwrap_or(0.0))
            })
            .then_with(|| a.segment_index.cmp(&b.segment_index))
            .then_with(|| a.bot_id.cmp(&b.bot_id))
    });
}

/// Insert the resumed-recording marker wherever consecutive timestamped
/// entries are more than [`GAP_SECONDS`] apart.
fn insert_gap_markers(entries: Vec<MergedEntry>) -> Vec<MergedEntry> {
    if entries.is_empty() {
        return entries;
    }

    let mut out: Vec<MergedEntry> = Vec::with_capacity(entries.len());
    let mut prev_ts: Option<f64> = None;

    for (idx, entry) in entries.into_iter().enumerate() {
        if let (Some(prev), Some(ts)) = (prev_ts, entry.timestamp) {
            if ts - prev > GAP_SECONDS {
                // The marker sorts right after the entry before the gap.
                out.push(MergedEntry {
                    speaker: None,
                    text: MERGE_MARKER_TEXT.to_string(),
                    timestamp: Some(prev + 0.0001),
                    bot_id: "system".to_string(),
                    segment_index: -1_000_000 + idx as i64,
                });
            }
        }
        if entry.timestamp.is_some() {
            prev_ts = entry.timestamp;
        }
        out.push(entry);
    }

    sort_entries(&mut out);
    out
}

fn render_text(entries: &[MergedEntry]) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.text == MERGE_MARKER_TEXT {
            lines.push(MERGE_MARKER_TEXT.to_string());
        } else if let Some(speaker) = &entry.speaker {
            lines.push(format!("{speaker}: {}", entry.text));
        } else {
            lines.push(entry.text.clone());
        }
    }
    let mut text = lines.join("\n").trim().to_string();
    text.push('\n');
    text
}
