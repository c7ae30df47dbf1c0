//! Immutable calendar event snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ms_domain::meeting::Occurrence;

/// One event instance as listed by the calendar provider.
///
/// Recurring events arrive pre-expanded (one snapshot per instance), so
/// `(event_id, start)` identifies an occurrence. The core never mutates
/// calendar state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub event_id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub meeting_url: Option<String>,
    /// Provider status string (`confirmed`, `tentative`, `cancelled`).
    pub status: String,
    pub is_all_day: bool,
}

impl CalendarEvent {
    pub fn occurrence(&self) -> Occurrence {
        Occurrence::new(self.event_id.clone(), self.start)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.eq_ignore_ascii_case("cancelled")
    }
}
