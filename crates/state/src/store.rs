//! Generic JSON-map file store.
//!
//! Backs the trigger map and the results map. Loading is tolerant: a
//! corrupted file is renamed to a `.corrupt.<ts>` backup and treated as
//! empty so one bad write never wedges the scheduler. Saves are atomic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use ms_domain::error::Result;

use crate::atomic;

/// A string-keyed map persisted as one JSON object.
pub struct JsonMapStore<V> {
    path: PathBuf,
    entries: RwLock<HashMap<String, V>>,
}

impl<V> JsonMapStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Load the store, backing up and ignoring a corrupt file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, V>>(&raw) {
                Ok(map) => map,
                Err(err) => {
                    back_up_corrupt(&path, &err);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Insert and persist in one step.
    pub fn insert(&self, key: String, value: V) -> Result<()> {
        {
            let mut entries = self.entries.write();
            entries.insert(key, value);
        }
        self.persist()
    }

    /// Snapshot of all entries (for scans).
    pub fn snapshot(&self) -> HashMap<String, V> {
        self.entries.read().clone()
    }

    fn persist(&self) -> Result<()> {
        let entries = self.entries.read();
        atomic::write_json(&self.path, &*entries)
    }
}

fn back_up_corrupt(path: &Path, err: &serde_json::Error) {
    let backup = path.with_extension(format!("corrupt.{}", Utc::now().timestamp()));
    tracing::warn!(
        path = %path.display(),
        backup = %backup.display(),
        error = %err,
        "state file corrupt; backing up and starting empty"
    );
    let _ = std::fs::rename(path, &backup);
}
