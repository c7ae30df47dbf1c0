//! Append-only supervisor audit log.
//!
//! One JSONL file per occurrence under `history/`. Every supervisor
//! decision lands here, which makes unattended runs debuggable after the
//! fact and gives the harvest pass a second source of bot ids.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ms_domain::error::Result;
use ms_domain::meeting::FailureCode;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    SupervisorStart {
        event_id: String,
        event_summary: String,
        event_start: DateTime<Utc>,
        event_end: DateTime<Utc>,
        meeting_url: String,
    },
    CreateAttempt {
        attempt_no: u32,
        denied_count: u32,
        kicked_count: u32,
    },
    CreateFailed {
        attempt_no: u32,
        error: String,
    },
    Created {
        attempt_no: u32,
        bot_id: String,
    },
    MeetingState {
        bot_id: String,
        meeting_state: Option<String>,
        event_type: Option<String>,
        state: Option<String>,
        denied_count: u32,
        kicked_count: u32,
    },
    BotRemoved {
        bot_id: String,
        kicked_count: u32,
    },
    WaitingRoomTimeout {
        bot_id: String,
        denied_count: u32,
    },
    EntryDenied {
        bot_id: String,
        denied_count: u32,
    },
    EntryDeniedReconnect {
        bot_id: String,
        denied_count: u32,
        kicked_count: u32,
    },
    HarvestStart {
        wait_seconds: u64,
        poll_seconds: u64,
        bot_ids: Vec<String>,
    },
    HarvestSaved {
        bot_id: String,
        path: String,
    },
    HarvestTimeout,
    SupervisorEnd {
        ok: bool,
        failure_code: Option<FailureCode>,
        message: String,
        final_bot_id: Option<String>,
        attempted_bot_ids: Vec<String>,
        denied_count: u32,
        kicked_count: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLine {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: HistoryEvent,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Log handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append-only JSONL writer for one occurrence.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one event, stamped with the current instant.
    ///
    /// Logging must never take down a supervised run, so callers treat a
    /// failed append as best-effort; this method still reports the error
    /// for the caller to log.
    pub fn append(&self, event: HistoryEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = HistoryLine {
            ts: Utc::now(),
            event,
        };
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&line)?)?;
        Ok(())
    }

    /// Read all lines back, skipping unparsable ones.
    pub fn read_all(&self) -> Vec<HistoryLine> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        raw.lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    /// Every bot id that appears anywhere in the log, in first-seen order.
    pub fn bot_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let mut push = |id: &str| {
            if !id.is_empty() && !ids.iter().any(|x| x == id) {
                ids.push(id.to_string());
            }
        };
        for line in self.read_all() {
            match &line.event {
                HistoryEvent::Created { bot_id, .. }
                | HistoryEvent::MeetingState { bot_id, .. }
                | HistoryEvent::BotRemoved { bot_id, .. }
                | HistoryEvent::WaitingRoomTimeout { bot_id, .. }
                | HistoryEvent::EntryDenied { bot_id, .. }
                | HistoryEvent::EntryDeniedReconnect { bot_id, .. }
                | HistoryEvent::HarvestSaved { bot_id, .. } => push(bot_id),
                HistoryEvent::HarvestStart { bot_ids, .. } => {
                    for id in bot_ids {
                        push(id);
                    }
                }
                HistoryEvent::SupervisorEnd {
                    attempted_bot_ids, ..
                } => {
                    for id in attempted_bot_ids {
                        push(id);
                    }
                }
                _ => {}
            }
        }
        ids
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
