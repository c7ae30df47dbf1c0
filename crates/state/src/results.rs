//! Terminal run results, queryable after the fact.

use std::path::PathBuf;

use ms_domain::error::Result;
use ms_domain::meeting::{MeetingRunResult, Occurrence};

use crate::store::JsonMapStore;

/// Durable map `occurrence key -> MeetingRunResult`
/// (`meeting_results.json`). One entry per occurrence; the harvest pass
/// scans it for bot ids whose transcripts are still missing.
pub struct ResultsStore {
    inner: JsonMapStore<MeetingRunResult>,
}

impl ResultsStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            inner: JsonMapStore::load(path)?,
        })
    }

    pub fn get(&self, occurrence: &Occurrence) -> Option<MeetingRunResult> {
        self.inner.get(&occurrence.key())
    }

    pub fn record(&self, result: &MeetingRunResult) -> Result<()> {
        self.inner.insert(result.occurrence().key(), result.clone())
    }

    /// All recorded results, for harvest scans.
    pub fn all(&self) -> Vec<MeetingRunResult> {
        self.inner.snapshot().into_values().collect()
    }
}
