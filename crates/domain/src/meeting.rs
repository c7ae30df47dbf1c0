//! Meeting run records shared by the scheduler and the supervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Occurrence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A specific `(event_id, start_instant)` pair.
///
/// Recurring calendar events expand into one occurrence per instance;
/// every durable record is keyed by the occurrence, never by the bare
/// event id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub event_id: String,
    pub start: DateTime<Utc>,
}

impl Occurrence {
    pub fn new(event_id: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.into(),
            start,
        }
    }

    /// The store key: `"event_id|start_iso"`.
    pub fn key(&self) -> String {
        format!("{}|{}", self.event_id, self.start.to_rfc3339())
    }

    /// Filename-safe start token (ISO with `:` replaced by `-`).
    pub fn safe_start(&self) -> String {
        self.start.to_rfc3339().replace(':', "-")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failure taxonomy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed set of terminal failure codes for a supervised meeting run.
///
/// Every run produces exactly one [`MeetingRunResult`] carrying either
/// `ok = true` or one of these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// Host denials reached the configured maximum.
    JoinRefusedMax,
    /// Bot removed/kicked the configured maximum number of times.
    KickedMax,
    /// Still supervising past `scheduled_end + overrun`.
    MaxDurationExceeded,
    /// Single-active-meeting policy rejected dispatch.
    SkippedOverlapConflict,
    /// Bot provider rejected creation with a non-retriable error.
    BotCreateFailed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structured outcome for one calendar event occurrence.
///
/// Small and JSON-serializable so unsupervised runs can persist it to
/// `meeting_results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRunResult {
    pub ok: bool,
    #[serde(default)]
    pub failure_code: Option<FailureCode>,
    pub message: String,
    pub event_id: String,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
    pub meeting_url: String,
    #[serde(default)]
    pub attempted_bot_ids: Vec<String>,
    #[serde(default)]
    pub final_bot_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl MeetingRunResult {
    pub fn occurrence(&self) -> Occurrence {
        Occurrence::new(self.event_id.clone(), self.event_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn occurrence_key_includes_start() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap();
        let occ = Occurrence::new("ev1", start);
        assert_eq!(occ.key(), "ev1|2025-03-10T14:00:00+00:00");
    }

    #[test]
    fn safe_start_has_no_colons() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 0).unwrap();
        let occ = Occurrence::new("ev1", start);
        assert!(!occ.safe_start().contains(':'));
    }

    #[test]
    fn recurrence_keys_do_not_collide() {
        let a = Occurrence::new("ev1", Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap());
        let b = Occurrence::new("ev1", Utc.with_ymd_and_hms(2025, 3, 17, 14, 0, 0).unwrap());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn failure_code_serializes_screaming() {
        let json = serde_json::to_string(&FailureCode::SkippedOverlapConflict).unwrap();
        assert_eq!(json, "\"SKIPPED_OVERLAP_CONFLICT\"");
    }
}
