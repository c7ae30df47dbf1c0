//! History payload interpretation.
//!
//! Provider event naming varies by version, so every predicate does
//! conservative lowercase substring matching rather than exact equality.

use serde_json::Value;

use crate::client::LatestStatus;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Latest-status selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pick the most relevant event out of a history payload.
///
/// Histories interleave media events (no meeting state) with state
/// events; the newest event *carrying a meeting state* wins, falling
/// back to the newest event of any kind.
pub fn latest_status_from_payload(payload: &Value) -> LatestStatus {
    let events = payload
        .pointer("/data/events")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut chosen: Option<&Value> = None;
    for event in &events {
        let data = event.get("data");
        let meeting_state = data
            .and_then(|d| d.get("meeting_state"))
            .and_then(Value::as_str);
        if meeting_state.map(|s| !s.trim().is_empty()).unwrap_or(false) {
            chosen = Some(event);
            break;
        }

        let state = data.and_then(|d| d.get("state")).and_then(Value::as_str);
        let event_type = event.get("event_type").and_then(Value::as_str);
        if state.map(|s| !s.trim().is_empty()).unwrap_or(false)
            && event_type.map(|t| t.contains("meeting_state")).unwrap_or(false)
        {
            chosen = Some(event);
            break;
        }
    }
    let chosen = chosen.or_else(|| events.first());

    let Some(event) = chosen else {
        return LatestStatus::default();
    };
    let data = event.get("data");

    LatestStatus {
        event_type: event
            .get("event_type")
            .and_then(Value::as_str)
            .map(str::to_string),
        state: data
            .and_then(|d| d.get("state"))
            .and_then(Value::as_str)
            .map(str::to_string),
        meeting_state: data
            .and_then(|d| d.get("meeting_state"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Signal predicates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn lower(s: Option<&str>) -> String {
    s.unwrap_or("").trim().to_lowercase()
}

pub fn is_waiting_room(meeting_state: Option<&str>) -> bool {
    let ms = lower(meeting_state);
    ms == "waiting_for_entry" || ms.contains("waiting")
}

pub fn is_active_recording(meeting_state: Option<&str>) -> bool {
    lower(meeting_state) == "recording_active"
}

pub fn is_failed_entry(meeting_state: Option<&str>) -> bool {
    matches!(
        lower(meeting_state).as_str(),
        "failed_entry" | "entry_denied" | "no_response"
    )
}

pub fn is_entry_denied(meeting_state: Option<&str>) -> bool {
    lower(meeting_state) == "entry_denied"
}

pub fn is_removed(status: &LatestStatus) -> bool {
    let et = lower(status.event_type.as_deref());
    let ms = lower(status.meeting_state.as_deref());
    let st = lower(status.state.as_deref());
    et.contains("removed")
        || et.contains("kicked")
        || ms.contains("removed")
        || ms.contains("kicked")
        || st == "removed"
}

pub fn looks_ended(meeting_state: Option<&str>) -> bool {
    let ms = lower(meeting_state);
    matches!(ms.as_str(), "meeting_ended" | "recording_ended" | "ended" | "completed")
        || ms.ends_with("_ended")
}

pub fn looks_disconnected(meeting_state: Option<&str>) -> bool {
    let ms = lower(meeting_state);
    ms == "connection_lost" || ms.contains("disconnect")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn newest_state_carrying_event_wins() {
        // Media event is newer but has no meeting_state.
        let payload = json!({
            "data": {
                "events": [
                    {"event_type": "notetaker.media", "data": {"media": {}}},
                    {"event_type": "notetaker.meeting_state",
                     "data": {"meeting_state": "recording_active", "state": "attending"}},
                    {"event_type": "notetaker.meeting_state",
                     "data": {"meeting_state": "waiting_for_entry"}},
                ]
            }
        });
        let status = latest_status_from_payload(&payload);
        assert_eq!(status.meeting_state.as_deref(), Some("recording_active"));
        assert_eq!(status.state.as_deref(), Some("attending"));
    }

    #[test]
    fn falls_back_to_newest_event() {
        let payload = json!({
            "data": {
                "events": [
                    {"event_type": "notetaker.created", "data": {}},
                ]
            }
        });
        let status = latest_status_from_payload(&payload);
        assert_eq!(status.event_type.as_deref(), Some("notetaker.created"));
        assert_eq!(status.meeting_state, None);
    }

    #[test]
    fn empty_history_is_default() {
        let status = latest_status_from_payload(&json!({}));
        assert_eq!(status.meeting_state, None);
        assert_eq!(status.event_type, None);
    }

    #[test]
    fn waiting_room_matching() {
        assert!(is_waiting_room(Some("waiting_for_entry")));
        assert!(is_waiting_room(Some("Waiting In Lobby")));
        assert!(!is_waiting_room(Some("recording_active")));
        assert!(!is_waiting_room(None));
    }

    #[test]
    fn failed_entry_set() {
        assert!(is_failed_entry(Some("failed_entry")));
        assert!(is_failed_entry(Some("entry_denied")));
        assert!(is_failed_entry(Some("no_response")));
        assert!(!is_failed_entry(Some("waiting_for_entry")));

        assert!(is_entry_denied(Some("ENTRY_DENIED")));
        assert!(!is_entry_denied(Some("failed_entry")));
    }

    #[test]
    fn removed_matches_across_fields() {
        let from = |et: Option<&str>, ms: Option<&str>, st: Option<&str>| LatestStatus {
            event_type: et.map(String::from),
            meeting_state: ms.map(String::from),
            state: st.map(String::from),
        };
        assert!(is_removed(&from(Some("notetaker.bot_removed"), None, None)));
        assert!(is_removed(&from(None, Some("kicked_from_meeting"), None)));
        assert!(is_removed(&from(None, None, Some("removed"))));
        assert!(!is_removed(&from(Some("notetaker.media"), Some("recording_active"), None)));
    }

    #[test]
    fn ended_and_disconnected() {
        assert!(looks_ended(Some("meeting_ended")));
        assert!(looks_ended(Some("call_ended")));
        assert!(looks_ended(Some("completed")));
        assert!(!looks_ended(Some("recording_active")));

        assert!(looks_disconnected(Some("disconnected")));
        assert!(looks_disconnected(Some("connection_lost")));
        assert!(!looks_disconnected(Some("waiting_for_entry")));
    }
}
