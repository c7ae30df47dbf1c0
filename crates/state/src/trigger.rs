//! At-most-once dispatch bookkeeping.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use ms_domain::error::Result;
use ms_domain::meeting::Occurrence;

use crate::store::JsonMapStore;

/// Durable map `occurrence key -> start instant`.
///
/// Presence of an entry means "do not dispatch again for this
/// occurrence". Written only after a terminal supervisor outcome
/// (including skipped-due-to-conflict), so a crash mid-run re-triggers
/// the meeting on restart rather than silently dropping it.
pub struct TriggerStore {
    inner: JsonMapStore<DateTime<Utc>>,
}

impl TriggerStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            inner: JsonMapStore::load(path)?,
        })
    }

    /// Has this occurrence already been dispatched?
    pub fn is_triggered(&self, occurrence: &Occurrence) -> bool {
        self.inner.contains(&occurrence.key())
    }

    /// Record a terminal outcome for the occurrence.
    pub fn mark_triggered(&self, occurrence: &Occurrence) -> Result<()> {
        self.inner.insert(occurrence.key(), occurrence.start)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
