//! Poll-tick eligibility classification.
//!
//! Pure functions so the windowing rules stay unit-testable without a
//! live calendar.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use ms_domain::config::CalendarConfig;
use ms_domain::meeting::Occurrence;

use crate::event::CalendarEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Join window around an event start.
#[derive(Debug, Clone, Copy)]
pub struct JoinPolicy {
    /// How early before the start a join is attempted.
    pub join_before: Duration,
    /// How late after the start an initial join is still attempted.
    pub join_after: Duration,
}

impl JoinPolicy {
    pub fn from_config(cfg: &CalendarConfig) -> Self {
        Self {
            join_before: Duration::minutes(cfg.join_before_minutes),
            join_after: Duration::minutes(cfg.join_after_minutes),
        }
    }
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self {
            join_before: Duration::minutes(2),
            join_after: Duration::minutes(15),
        }
    }
}

/// Why an event was skipped this tick (permanently, for this occurrence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Cancelled,
    AllDay,
    AlreadyEnded,
    NoMeetingUrl,
    AlreadyTriggered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Dispatch now.
    Eligible,
    /// Outside the join window but still upcoming; re-evaluated next tick.
    NotYet,
    Skip(SkipReason),
}

/// Classify one event at instant `now`.
///
/// Eligible when a supported meeting URL exists and either the clock sits
/// inside `[start − join_before, start + join_after]` or the meeting is
/// already in progress (`start ≤ now < end`, the late-join branch).
pub fn classify(
    event: &CalendarEvent,
    now: DateTime<Utc>,
    policy: &JoinPolicy,
    already_triggered: bool,
) -> Eligibility {
    if event.is_cancelled() {
        return Eligibility::Skip(SkipReason::Cancelled);
    }
    if event.is_all_day {
        return Eligibility::Skip(SkipReason::AllDay);
    }
    if now >= event.end {
        return Eligibility::Skip(SkipReason::AlreadyEnded);
    }
    if event.meeting_url.is_none() {
        return Eligibility::Skip(SkipReason::NoMeetingUrl);
    }
    if already_triggered {
        return Eligibility::Skip(SkipReason::AlreadyTriggered);
    }

    let window_open = event.start - policy.join_before;
    let window_close = event.start + policy.join_after;
    let in_join_window = now >= window_open && now <= window_close;
    let in_progress = now >= event.start && now < event.end;

    if in_join_window || in_progress {
        Eligibility::Eligible
    } else {
        Eligibility::NotYet
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tick assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deduplicate by occurrence, classify, and return the eligible events
/// sorted by start instant.
pub fn eligible_events(
    events: &[CalendarEvent],
    now: DateTime<Utc>,
    policy: &JoinPolicy,
    is_triggered: impl Fn(&Occurrence) -> bool,
) -> Vec<CalendarEvent> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut eligible: Vec<CalendarEvent> = Vec::new();

    for event in events {
        let occurrence = event.occurrence();
        if !seen.insert(occurrence.key()) {
            continue;
        }
        match classify(event, now, policy, is_triggered(&occurrence)) {
            Eligibility::Eligible => eligible.push(event.clone()),
            Eligibility::NotYet => {}
            Eligibility::Skip(reason) => {
                tracing::debug!(
                    event_id = %event.event_id,
                    start = %event.start,
                    ?reason,
                    "event not eligible"
                );
            }
        }
    }

    eligible.sort_by_key(|e| e.start);
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_event() -> CalendarEvent {
        CalendarEvent {
            event_id: "ev1".into(),
            summary: "Sync".into(),
            start: Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap(),
            meeting_url: Some("https://meet.google.com/abc-defg-hij".into()),
            status: "confirmed".into(),
            is_all_day: false,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn eligible_inside_join_window() {
        let policy = JoinPolicy::default();
        let event = base_event();
        assert_eq!(
            classify(&event, at(13, 58), &policy, false),
            Eligibility::Eligible
        );
        assert_eq!(
            classify(&event, at(14, 15), &policy, false),
            Eligibility::Eligible
        );
    }

    #[test]
    fn not_yet_before_window() {
        let policy = JoinPolicy::default();
        assert_eq!(
            classify(&base_event(), at(13, 50), &policy, false),
            Eligibility::NotYet
        );
    }

    #[test]
    fn late_join_while_in_progress() {
        let policy = JoinPolicy::default();
        // Past start+15m but the meeting is still running.
        assert_eq!(
            classify(&base_event(), at(14, 30), &policy, false),
            Eligibility::Eligible
        );
    }

    #[test]
    fn skip_after_end() {
        let policy = JoinPolicy::default();
        assert_eq!(
            classify(&base_event(), at(15, 0), &policy, false),
            Eligibility::Skip(SkipReason::AlreadyEnded)
        );
    }

    #[test]
    fn skip_without_url() {
        let policy = JoinPolicy::default();
        let mut event = base_event();
        event.meeting_url = None;
        assert_eq!(
            classify(&event, at(14, 0), &policy, false),
            Eligibility::Skip(SkipReason::NoMeetingUrl)
        );
    }

    #[test]
    fn skip_cancelled_and_all_day() {
        let policy = JoinPolicy::default();
        let mut cancelled = base_event();
        cancelled.status = "cancelled".into();
        assert_eq!(
            classify(&cancelled, at(14, 0), &policy, false),
            Eligibility::Skip(SkipReason::Cancelled)
        );

        let mut all_day = base_event();
        all_day.is_all_day = true;
        assert_eq!(
            classify(&all_day, at(14, 0), &policy, false),
            Eligibility::Skip(SkipReason::AllDay)
        );
    }

    #[test]
    fn skip_already_triggered() {
        let policy = JoinPolicy::default();
        assert_eq!(
            classify(&base_event(), at(14, 0), &policy, true),
            Eligibility::Skip(SkipReason::AlreadyTriggered)
        );
    }

    #[test]
    fn tick_dedupes_and_sorts() {
        let policy = JoinPolicy::default();
        let first = base_event();
        let mut second = base_event();
        second.event_id = "ev2".into();
        second.start = at(14, 1);
        second.end = at(15, 1);

        // Duplicate of `first` plus a later event, listed out of order.
        let events = vec![second.clone(), first.clone(), first.clone()];
        let eligible = eligible_events(&events, at(14, 0), &policy, |_| false);

        let ids: Vec<&str> = eligible.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["ev1", "ev2"]);
    }
}
