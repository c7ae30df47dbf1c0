//! The poll/schedule loop.
//!
//! One tick: list the calendar window, classify eligibility, pick the
//! earliest eligible event, mark every other eligible event as an
//! overlap conflict, take the active-meeting lock, and supervise the
//! chosen meeting inline. Supervision blocking the loop is what
//! enforces the single-active-meeting invariant.

use std::sync::Arc;

use chrono::{Duration, Utc};

use ms_calendar::{eligible_events, CalendarEvent, CalendarSource, JoinPolicy};
use ms_domain::config::Config;
use ms_domain::error::Result;
use ms_domain::meeting::{FailureCode, MeetingRunResult, Occurrence};
use ms_notetaker::{MeetingRef, NotetakerApi, Supervisor, SupervisorConfig};
use ms_state::{ActiveMeetingLock, ResultsStore, StatePaths, TriggerStore};

pub struct Scheduler {
    calendar: Arc<dyn CalendarSource>,
    notetaker: Arc<dyn NotetakerApi>,
    paths: StatePaths,
    trigger: TriggerStore,
    results: ResultsStore,
    lock: ActiveMeetingLock,
    policy: JoinPolicy,
    supervisor_config: SupervisorConfig,
    poll_interval: std::time::Duration,
    lookback: Duration,
    window: Duration,
    lock_overrun: Duration,
    dry_run: bool,
}

impl Scheduler {
    pub fn new(
        calendar: Arc<dyn CalendarSource>,
        notetaker: Arc<dyn NotetakerApi>,
        config: &Config,
        dry_run: bool,
    ) -> Result<Self> {
        let paths = StatePaths::new(&config.state.path);
        let trigger = TriggerStore::load(paths.trigger_state())?;
        let results = ResultsStore::load(paths.meeting_results())?;
        let lock = ActiveMeetingLock::new(paths.active_meeting());

        Ok(Self {
            calendar,
            notetaker,
            paths,
            trigger,
            results,
            lock,
            policy: JoinPolicy::from_config(&config.calendar),
            supervisor_config: SupervisorConfig::from_config(&config.notetaker),
            poll_interval: std::time::Duration::from_secs(config.calendar.poll_seconds),
            lookback: Duration::minutes(config.calendar.lookback_minutes),
            window: Duration::minutes(config.calendar.window_minutes),
            lock_overrun: Duration::seconds(config.notetaker.max_overrun_seconds),
            dry_run,
        })
    }

    /// Run poll ticks until Ctrl-C (or forever); `once` runs one tick.
    pub async fn run(&self, once: bool) -> Result<()> {
        tracing::info!(
            poll_seconds = self.poll_interval.as_secs(),
            dry_run = self.dry_run,
            "scheduler running"
        );
        loop {
            if let Err(err) = self.tick().await {
                tracing::error!(error = %err, "poll tick failed");
            }
            if once {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted; stopping after current tick");
                    return Ok(());
                }
            }
        }
    }

    /// One poll tick.
    pub async fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let events = self
            .calendar
            .list_events(now - self.lookback, now + self.window)
            .await?;

        let eligible = eligible_events(&events, now, &self.policy, |occ| {
            self.trigger.is_triggered(occ)
        });
        let Some((chosen, others)) = eligible.split_first() else {
            tracing::debug!(listed = events.len(), "no eligible events this tick");
            return Ok(());
        };

        if self.dry_run {
            tracing::info!(
                event_id = %chosen.event_id,
                summary = %chosen.summary,
                skipped_overlaps = others.len(),
                "(dry-run) would dispatch"
            );
            return Ok(());
        }

        // A shared bot identity can only occupy one meeting: everything
        // beyond the earliest eligible event is a permanent skip.
        for other in others {
            self.record_skip(other, "Skipped: another meeting was selected this tick.")?;
        }

        let occurrence = chosen.occurrence();
        let expires_at = chosen.end + self.lock_overrun;
        if !self.lock.acquire(&occurrence, expires_at)? {
            tracing::warn!(event_id = %chosen.event_id, "active-meeting lock busy");
            self.record_skip(chosen, "Skipped: another meeting is already active.")?;
            return Ok(());
        }

        let meeting = MeetingRef {
            event_id: chosen.event_id.clone(),
            summary: chosen.summary.clone(),
            meeting_url: chosen.meeting_url.clone().unwrap_or_default(),
            start: chosen.start,
            end: chosen.end,
        };
        tracing::info!(
            event_id = %meeting.event_id,
            summary = %meeting.summary,
            start = %meeting.start,
            "dispatching supervisor"
        );

        let supervisor = Supervisor::new(
            self.notetaker.clone(),
            self.paths.clone(),
            self.supervisor_config.clone(),
        );
        let result = supervisor.supervise(&meeting).await;

        self.trigger.mark_triggered(&occurrence)?;
        self.results.record(&result)?;
        self.lock.release(&occurrence);

        Ok(())
    }

    /// Permanently skip an occurrence with `SKIPPED_OVERLAP_CONFLICT`.
    fn record_skip(&self, event: &CalendarEvent, message: &str) -> Result<()> {
        let occurrence: Occurrence = event.occurrence();
        let now = Utc::now();
        let result = MeetingRunResult {
            ok: false,
            failure_code: Some(FailureCode::SkippedOverlapConflict),
            message: message.to_string(),
            event_id: event.event_id.clone(),
            event_start: event.start,
            event_end: event.end,
            meeting_url: event.meeting_url.clone().unwrap_or_default(),
            attempted_bot_ids: Vec::new(),
            final_bot_id: None,
            started_at: now,
            ended_at: now,
        };
        self.trigger.mark_triggered(&occurrence)?;
        self.results.record(&result)?;
        tracing::info!(event_id = %event.event_id, start = %event.start, "occurrence skipped (overlap)");
        Ok(())
    }
}
