//! Per-meeting pipeline storage.
//!
//! Chunks, facts, and inputs live in memory behind locks and persist as
//! JSONL files per stage (`pipeline/<meeting_id>/{chunks,facts,inputs}
//! .jsonl`). Each mutation rewrites its stage file atomically, so a
//! crash leaves whole stages, never half-written rows.

use std::path::PathBuf;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use ms_domain::error::Result;
use ms_domain::facts::{ExtractedFact, InputRecord, TranscriptChunk};
use ms_state::StatePaths;

pub struct MeetingStore {
    meeting_id: Uuid,
    dir: PathBuf,
    chunks: RwLock<Vec<TranscriptChunk>>,
    facts: RwLock<Vec<ExtractedFact>>,
    inputs: RwLock<Vec<InputRecord>>,
}

impl MeetingStore {
    /// Open (or create) the store for one meeting, loading any rows a
    /// previous run persisted.
    pub fn open(paths: &StatePaths, meeting_id: Uuid) -> Result<Self> {
        let dir = paths.pipeline_dir(&meeting_id.to_string());
        let chunks = read_jsonl(&dir.join("chunks.jsonl"));
        let facts = read_jsonl(&dir.join("facts.jsonl"));
        let inputs = read_jsonl(&dir.join("inputs.jsonl"));

        Ok(Self {
            meeting_id,
            dir,
            chunks: RwLock::new(chunks),
            facts: RwLock::new(facts),
            inputs: RwLock::new(inputs),
        })
    }

    pub fn meeting_id(&self) -> Uuid {
        self.meeting_id
    }

    // ── Chunks ─────────────────────────────────────────────────────

    pub fn chunks(&self) -> Vec<TranscriptChunk> {
        self.chunks.read().clone()
    }

    pub fn insert_chunks(&self, rows: Vec<TranscriptChunk>) -> Result<usize> {
        let inserted = rows.len();
        {
            let mut chunks = self.chunks.write();
            chunks.extend(rows);
        }
        self.persist_stage("chunks.jsonl", &*self.chunks.read())?;
        Ok(inserted)
    }

    // ── Facts ──────────────────────────────────────────────────────

    pub fn facts(&self) -> Vec<ExtractedFact> {
        self.facts.read().clone()
    }

    pub fn unlabeled_facts(&self) -> Vec<ExtractedFact> {
        self.facts
            .read()
            .iter()
            .filter(|f| f.group_label.is_none())
            .cloned()
            .collect()
    }

    pub fn insert_facts(&self, rows: Vec<ExtractedFact>) -> Result<usize> {
        let inserted = rows.len();
        {
            let mut facts = self.facts.write();
            facts.extend(rows);
        }
        self.persist_stage("facts.jsonl", &*self.facts.read())?;
        Ok(inserted)
    }

    /// Apply grouping results. Unknown ids are ignored.
    pub fn set_group_labels(&self, labels: &[(Uuid, String)]) -> Result<usize> {
        let mut updated = 0;
        {
            let mut facts = self.facts.write();
            for (fact_id, label) in labels {
                if let Some(fact) = facts.iter_mut().find(|f| f.id == *fact_id) {
                    fact.group_label = Some(label.clone());
                    updated += 1;
                }
            }
        }
        self.persist_stage("facts.jsonl", &*self.facts.read())?;
        Ok(updated)
    }

    // ── Inputs ─────────────────────────────────────────────────────

    pub fn inputs(&self) -> Vec<InputRecord> {
        self.inputs.read().clone()
    }

    pub fn insert_inputs(&self, rows: Vec<InputRecord>) -> Result<usize> {
        let inserted = rows.len();
        {
            let mut inputs = self.inputs.write();
            inputs.extend(rows);
        }
        self.persist_stage("inputs.jsonl", &*self.inputs.read())?;
        Ok(inserted)
    }

    // ── Persistence ────────────────────────────────────────────────

    fn persist_stage<T: Serialize>(&self, file: &str, rows: &[T]) -> Result<()> {
        let mut out = String::new();
        for row in rows {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        ms_state::atomic::write_text(&self.dir.join(file), &out)
    }
}

fn read_jsonl<T: DeserializeOwned>(path: &std::path::Path) -> Vec<T> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}
