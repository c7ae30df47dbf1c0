//! The meeting supervisor.
//!
//! Drives one bot (or several, across rejoins) through a single meeting
//! occurrence. The outer loop creates bots; the inner loop observes the
//! provider's history and reacts: waiting rooms time out, denials and
//! kicks count toward caps, disconnects after observed recording trigger
//! rejoins, and the run ends when two independent end signals agree.
//!
//! Every exit path yields exactly one [`MeetingRunResult`]. Transcript
//! harvesting runs on a detached task so the next meeting can be picked
//! up immediately.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;

use ms_domain::config::NotetakerConfig;
use ms_domain::error::Error;
use ms_domain::meeting::{FailureCode, MeetingRunResult, Occurrence};
use ms_domain::retry::delay_within;
use ms_state::{HistoryEvent, HistoryLog, StatePaths};

use crate::client::NotetakerApi;
use crate::harvester::{spawn_harvest, HarvestConfig};
use crate::history::{
    is_active_recording, is_entry_denied, is_failed_entry, is_removed, is_waiting_room,
    looks_disconnected, looks_ended,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The meeting the supervisor is asked to join.
#[derive(Debug, Clone)]
pub struct MeetingRef {
    pub event_id: String,
    pub summary: String,
    pub meeting_url: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MeetingRef {
    pub fn occurrence(&self) -> Occurrence {
        Occurrence::new(self.event_id.clone(), self.start)
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How early before the start joining begins.
    pub join_window_before: Duration,
    pub max_entry_denials: u32,
    pub max_kicks: u32,
    /// Delay range between bot-create attempts.
    pub join_retry_min: StdDuration,
    pub join_retry_max: StdDuration,
    /// How long one bot may sit in the waiting room.
    pub waiting_room_timeout: StdDuration,
    /// Pause before a rejoin attempt after a disconnect.
    pub reconnect_interval: StdDuration,
    /// Hard stop past the scheduled end.
    pub max_overrun: Duration,
    /// Past this grace the meeting counts as over.
    pub event_end_grace: Duration,
    /// Interval between history polls.
    pub status_poll: StdDuration,
    /// Background harvest behavior after the run.
    pub transcript_poll: StdDuration,
    pub transcript_wait: StdDuration,
}

impl SupervisorConfig {
    pub fn from_config(cfg: &NotetakerConfig) -> Self {
        Self {
            join_window_before: Duration::minutes(2),
            max_entry_denials: cfg.max_entry_denials,
            max_kicks: cfg.max_kicks,
            join_retry_min: StdDuration::from_secs(cfg.join_retry_min_seconds),
            join_retry_max: StdDuration::from_secs(cfg.join_retry_max_seconds),
            waiting_room_timeout: StdDuration::from_secs(cfg.waiting_room_timeout_seconds),
            reconnect_interval: StdDuration::from_secs(cfg.reconnect_interval_seconds),
            max_overrun: Duration::seconds(cfg.max_overrun_seconds),
            event_end_grace: Duration::seconds(cfg.event_end_grace_seconds),
            status_poll: StdDuration::from_secs(cfg.status_poll_seconds),
            transcript_poll: StdDuration::from_secs(cfg.transcript_poll_seconds),
            transcript_wait: StdDuration::from_secs(cfg.transcript_wait_seconds),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Internal plumbing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maps calendar instants onto the runtime clock so deadlines work under
/// paused test time.
struct Timeline {
    anchor_instant: Instant,
    anchor_utc: DateTime<Utc>,
}

impl Timeline {
    fn new(anchor_utc: DateTime<Utc>) -> Self {
        Self {
            anchor_instant: Instant::now(),
            anchor_utc,
        }
    }

    /// The runtime instant corresponding to `t`. Instants already in the
    /// past clamp to the anchor.
    fn instant_of(&self, t: DateTime<Utc>) -> Instant {
        match (t - self.anchor_utc).to_std() {
            Ok(offset) => self.anchor_instant + offset,
            Err(_) => self.anchor_instant,
        }
    }
}

struct RunState {
    denied: u32,
    kicked: u32,
    attempted: Vec<String>,
}

impl RunState {
    fn record_bot(&mut self, bot_id: &str) {
        if !bot_id.is_empty() && !self.attempted.iter().any(|b| b == bot_id) {
            self.attempted.push(bot_id.to_string());
        }
    }

    fn last_bot(&self) -> Option<String> {
        self.attempted.last().cloned()
    }
}

struct Terminal {
    ok: bool,
    code: Option<FailureCode>,
    message: String,
    final_id: Option<String>,
}

enum InnerOutcome {
    /// The run is over.
    Finalize(Terminal),
    /// Create a fresh bot and keep supervising.
    NewAttempt,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Supervisor {
    api: Arc<dyn NotetakerApi>,
    paths: StatePaths,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(api: Arc<dyn NotetakerApi>, paths: StatePaths, config: SupervisorConfig) -> Self {
        Self { api, paths, config }
    }

    /// Supervise one occurrence to a terminal outcome. Blocking by
    /// design: the scheduler's single-active-meeting policy relies on it.
    pub async fn supervise(&self, meeting: &MeetingRef) -> MeetingRunResult {
        let occurrence = meeting.occurrence();
        let history = HistoryLog::new(self.paths.history_log(&occurrence));
        let started_at = Utc::now();
        let timeline = Timeline::new(started_at);

        let join_open = timeline.instant_of(meeting.start - self.config.join_window_before);
        let max_end = timeline.instant_of(meeting.end + self.config.max_overrun);
        let grace = timeline.instant_of(meeting.end + self.config.event_end_grace);

        self.log(
            &history,
            HistoryEvent::SupervisorStart {
                event_id: meeting.event_id.clone(),
                event_summary: meeting.summary.clone(),
                event_start: meeting.start,
                event_end: meeting.end,
                meeting_url: meeting.meeting_url.clone(),
            },
        );

        // Some rooms reject bots that arrive too early.
        if Instant::now() < join_open {
            tracing::info!(event_id = %meeting.event_id, "waiting for join window to open");
            tokio::time::sleep_until(join_open).await;
        }

        let mut run = RunState {
            denied: 0,
            kicked: 0,
            attempted: Vec::new(),
        };
        let mut attempt_no: u32 = 0;

        // ── Outer create-attempt loop ──────────────────────────────
        let terminal = loop {
            if Instant::now() > max_end {
                break Terminal {
                    ok: true,
                    code: None,
                    message: "Meeting ended (attempt deadline exceeded).".into(),
                    final_id: run.last_bot(),
                };
            }
            if Instant::now() >= grace {
                break Terminal {
                    ok: true,
                    code: None,
                    message: "Meeting ended (event end grace exceeded).".into(),
                    final_id: run.last_bot(),
                };
            }
            if run.denied >= self.config.max_entry_denials {
                break Terminal {
                    ok: false,
                    code: Some(FailureCode::JoinRefusedMax),
                    message: format!("Join refused/denied {} times; giving up.", run.denied),
                    final_id: run.last_bot(),
                };
            }
            if run.kicked >= self.config.max_kicks {
                break Terminal {
                    ok: false,
                    code: Some(FailureCode::KickedMax),
                    message: format!("Bot was kicked/removed {} times; giving up.", run.kicked),
                    final_id: run.last_bot(),
                };
            }

            attempt_no += 1;
            self.log(
                &history,
                HistoryEvent::CreateAttempt {
                    attempt_no,
                    denied_count: run.denied,
                    kicked_count: run.kicked,
                },
            );

            let bot_id = match self.api.create_bot(&meeting.meeting_url, None).await {
                Ok(bot_id) => bot_id,
                Err(err) => {
                    if is_non_retriable_create(&err) {
                        break Terminal {
                            ok: false,
                            code: Some(FailureCode::BotCreateFailed),
                            message: format!("Bot provider rejected creation: {err}"),
                            final_id: run.last_bot(),
                        };
                    }
                    tracing::warn!(error = %err, attempt_no, "bot create failed; will retry");
                    self.log(
                        &history,
                        HistoryEvent::CreateFailed {
                            attempt_no,
                            error: err.to_string(),
                        },
                    );
                    tokio::time::sleep(self.join_retry_delay(attempt_no)).await;
                    continue;
                }
            };

            tracing::info!(event_id = %meeting.event_id, bot_id = %bot_id, attempt_no, "bot created");
            run.record_bot(&bot_id);
            self.log(
                &history,
                HistoryEvent::Created {
                    attempt_no,
                    bot_id: bot_id.clone(),
                },
            );

            match self
                .observe(bot_id, meeting, max_end, grace, &mut run, &history)
                .await
            {
                InnerOutcome::Finalize(terminal) => break terminal,
                InnerOutcome::NewAttempt => {
                    tokio::time::sleep(self.join_retry_delay(attempt_no)).await;
                }
            }
        };

        self.finalize(meeting, started_at, run, terminal, &history)
    }

    /// Inner observe-and-react loop for one (possibly rejoined) bot.
    async fn observe(
        &self,
        mut bot_id: String,
        meeting: &MeetingRef,
        max_end: Instant,
        grace: Instant,
        run: &mut RunState,
        history: &HistoryLog,
    ) -> InnerOutcome {
        let occurrence = meeting.occurrence();
        let waiting_deadline = Instant::now() + self.config.waiting_room_timeout;
        let mut had_recording = false;
        let mut last_logged_state: Option<String> = None;
        let mut last_poll_error: Option<Instant> = None;

        loop {
            if Instant::now() > max_end {
                return InnerOutcome::Finalize(Terminal {
                    ok: false,
                    code: Some(FailureCode::MaxDurationExceeded),
                    message: "Meeting exceeded scheduled end + overrun; stopping supervision."
                        .into(),
                    final_id: Some(bot_id),
                });
            }
            if Instant::now() >= grace {
                return InnerOutcome::Finalize(Terminal {
                    ok: true,
                    code: None,
                    message: "Meeting ended (event end grace exceeded).".into(),
                    final_id: Some(bot_id),
                });
            }

            // Transient history failures never end a run; just poll again.
            let status = match self.api.latest_status(&bot_id).await {
                Ok(status) => status,
                Err(err) => {
                    let now = Instant::now();
                    let recently_logged = last_poll_error
                        .map(|t| now.duration_since(t) < StdDuration::from_secs(20))
                        .unwrap_or(false);
                    if !recently_logged {
                        tracing::warn!(bot_id = %bot_id, error = %err, "history fetch failed; will retry");
                        last_poll_error = Some(now);
                    }
                    tokio::time::sleep(self.config.status_poll).await;
                    continue;
                }
            };

            let meeting_state = status.meeting_state.as_deref();
            if status.meeting_state != last_logged_state {
                tracing::info!(
                    bot_id = %bot_id,
                    meeting_state = meeting_state.unwrap_or("-"),
                    event_type = status.event_type.as_deref().unwrap_or("-"),
                    "meeting state changed"
                );
                self.log(
                    history,
                    HistoryEvent::MeetingState {
                        bot_id: bot_id.clone(),
                        meeting_state: status.meeting_state.clone(),
                        event_type: status.event_type.clone(),
                        state: status.state.clone(),
                        denied_count: run.denied,
                        kicked_count: run.kicked,
                    },
                );
                last_logged_state = status.meeting_state.clone();
            }

            // ── End-signal scoring ─────────────────────────────────
            // One signal can be a transient glitch; two independent ones
            // end the run.
            let api_reports_ended = looks_ended(meeting_state);
            let grace_exceeded = Instant::now() >= grace;
            let media_available = self
                .api
                .media_links(&bot_id)
                .await
                .map(|links| links.any_available())
                .unwrap_or(false);

            let end_signals =
                u8::from(api_reports_ended) + u8::from(grace_exceeded) + u8::from(media_available);
            if end_signals >= 2 {
                self.save_media_snapshot(&occurrence, &bot_id).await;
                let mut reasons: Vec<&str> = Vec::new();
                if api_reports_ended {
                    reasons.push("api_reports_ended");
                }
                if grace_exceeded {
                    reasons.push("grace_exceeded");
                }
                if media_available {
                    reasons.push("media_available");
                }
                return InnerOutcome::Finalize(Terminal {
                    ok: true,
                    code: None,
                    message: format!("Meeting ended (signals={}).", reasons.join(",")),
                    final_id: Some(bot_id),
                });
            }

            if is_removed(&status) {
                run.kicked += 1;
                tracing::warn!(bot_id = %bot_id, kicked_count = run.kicked, "bot removed; will rejoin with a fresh bot");
                self.log(
                    history,
                    HistoryEvent::BotRemoved {
                        bot_id: bot_id.clone(),
                        kicked_count: run.kicked,
                    },
                );
                return InnerOutcome::NewAttempt;
            }

            if is_active_recording(meeting_state) {
                had_recording = true;
                // Crash-safe: persist media references as soon as they appear.
                self.save_media_snapshot(&occurrence, &bot_id).await;
                tokio::time::sleep(self.config.status_poll).await;
                continue;
            }

            // ── Rejoin after disconnect ────────────────────────────
            // Once recording was observed, a disconnect or entry failure
            // means the bot dropped out mid-meeting: rejoin with a new
            // bot on the same occurrence. Host refusals on rejoin count
            // toward the denial cap so this cannot loop forever.
            if had_recording
                && (looks_disconnected(meeting_state) || is_failed_entry(meeting_state))
            {
                if is_entry_denied(meeting_state) {
                    run.denied += 1;
                    self.log(
                        history,
                        HistoryEvent::EntryDeniedReconnect {
                            bot_id: bot_id.clone(),
                            denied_count: run.denied,
                            kicked_count: run.kicked,
                        },
                    );
                    if run.denied >= self.config.max_entry_denials {
                        return InnerOutcome::Finalize(Terminal {
                            ok: false,
                            code: Some(FailureCode::JoinRefusedMax),
                            message: format!(
                                "Rejoin refused/denied {} times; giving up.",
                                run.denied
                            ),
                            final_id: Some(bot_id),
                        });
                    }
                }

                tokio::time::sleep(self.config.reconnect_interval).await;
                match self.api.create_bot(&meeting.meeting_url, None).await {
                    Ok(new_id) => {
                        tracing::info!(old = %bot_id, new = %new_id, "rejoined with a fresh bot");
                        run.record_bot(&new_id);
                        bot_id = new_id;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "rejoin create failed; will retry");
                    }
                }
                continue;
            }

            if is_waiting_room(meeting_state) {
                if Instant::now() >= waiting_deadline {
                    run.denied += 1;
                    self.log(
                        history,
                        HistoryEvent::WaitingRoomTimeout {
                            bot_id: bot_id.clone(),
                            denied_count: run.denied,
                        },
                    );
                    return InnerOutcome::NewAttempt;
                }
                tokio::time::sleep(self.config.status_poll).await;
                continue;
            }

            if is_failed_entry(meeting_state) {
                if is_entry_denied(meeting_state) {
                    run.denied += 1;
                    tracing::info!(bot_id = %bot_id, denied_count = run.denied, "entry denied by host");
                    self.log(
                        history,
                        HistoryEvent::EntryDenied {
                            bot_id: bot_id.clone(),
                            denied_count: run.denied,
                        },
                    );
                    return InnerOutcome::NewAttempt;
                }
                // Meeting not ready yet; transient.
                tracing::info!(bot_id = %bot_id, "entry failed / meeting not ready; retrying");
                return InnerOutcome::NewAttempt;
            }

            tokio::time::sleep(self.config.status_poll).await;
        }
    }

    // ── Terminal handling ──────────────────────────────────────────

    fn finalize(
        &self,
        meeting: &MeetingRef,
        started_at: DateTime<Utc>,
        run: RunState,
        terminal: Terminal,
        history: &HistoryLog,
    ) -> MeetingRunResult {
        self.log(
            history,
            HistoryEvent::SupervisorEnd {
                ok: terminal.ok,
                failure_code: terminal.code,
                message: terminal.message.clone(),
                final_bot_id: terminal.final_id.clone(),
                attempted_bot_ids: run.attempted.clone(),
                denied_count: run.denied,
                kicked_count: run.kicked,
            },
        );

        // Transcript availability lags meeting end; harvest on a
        // detached task so the scheduler is free for the next meeting.
        if !run.attempted.is_empty() && !self.config.transcript_wait.is_zero() {
            spawn_harvest(
                self.api.clone(),
                self.paths.clone(),
                meeting.occurrence(),
                run.attempted.clone(),
                HarvestConfig {
                    poll: self.config.transcript_poll,
                    wait: self.config.transcript_wait,
                },
            );
        }

        tracing::info!(
            event_id = %meeting.event_id,
            ok = terminal.ok,
            code = ?terminal.code,
            message = %terminal.message,
            "supervision finished"
        );

        MeetingRunResult {
            ok: terminal.ok,
            failure_code: terminal.code,
            message: terminal.message,
            event_id: meeting.event_id.clone(),
            event_start: meeting.start,
            event_end: meeting.end,
            meeting_url: meeting.meeting_url.clone(),
            attempted_bot_ids: run.attempted,
            final_bot_id: terminal.final_id,
            started_at,
            ended_at: Utc::now(),
        }
    }

    fn join_retry_delay(&self, attempt_no: u32) -> StdDuration {
        delay_within(
            self.config.join_retry_min,
            self.config.join_retry_max,
            attempt_no,
        )
    }

    /// Persist media metadata opportunistically. Never overwrites and
    /// never fails the run.
    async fn save_media_snapshot(&self, occurrence: &Occurrence, bot_id: &str) {
        let Ok(links) = self.api.media_links(bot_id).await else {
            return;
        };
        if links.transcript.is_none() && links.recording.is_none() {
            return;
        }
        let path = self.paths.media_sidecar(occurrence, bot_id);
        if path.exists() {
            return;
        }
        if let Err(err) = ms_state::atomic::write_json(&path, &links) {
            tracing::debug!(error = %err, "media snapshot write failed");
        }
    }

    fn log(&self, history: &HistoryLog, event: HistoryEvent) {
        if let Err(err) = history.append(event) {
            tracing::debug!(error = %err, "history append failed");
        }
    }
}

/// Creation failures that retrying cannot fix (auth, payload).
fn is_non_retriable_create(err: &Error) -> bool {
    match err {
        Error::Auth(_) => true,
        Error::Notetaker { status, .. } => (400..500).contains(status) && *status != 429,
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LatestStatus, MediaEntry, MediaLinks};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Clone)]
    struct Step {
        status: LatestStatus,
        media_available: bool,
    }

    fn step(meeting_state: &str, media: bool) -> Step {
        Step {
            status: LatestStatus {
                event_type: None,
                state: None,
                meeting_state: Some(meeting_state.to_string()),
            },
            media_available: media,
        }
    }

    /// Scripted provider: each history poll consumes one step; the final
    /// step repeats forever.
    struct ScriptedApi {
        steps: Mutex<VecDeque<Step>>,
        current: Mutex<Step>,
        created: Mutex<u32>,
        create_error: Option<(u16, String)>,
    }

    impl ScriptedApi {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                current: Mutex::new(step("waiting_for_entry", false)),
                created: Mutex::new(0),
                create_error: None,
            })
        }

        fn failing_create(status: u16) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(VecDeque::new()),
                current: Mutex::new(step("waiting_for_entry", false)),
                created: Mutex::new(0),
                create_error: Some((status, "rejected".into())),
            })
        }
    }

    #[async_trait::async_trait]
    impl NotetakerApi for ScriptedApi {
        async fn create_bot(&self, _url: &str, _join: Option<i64>) -> ms_domain::error::Result<String> {
            if let Some((status, message)) = &self.create_error {
                return Err(Error::Notetaker {
                    status: *status,
                    message: message.clone(),
                });
            }
            let mut created = self.created.lock();
            *created += 1;
            Ok(format!("bot-{created}"))
        }

        async fn latest_status(&self, _bot_id: &str) -> ms_domain::error::Result<LatestStatus> {
            let mut current = self.current.lock();
            if let Some(next) = self.steps.lock().pop_front() {
                *current = next;
            }
            Ok(current.status.clone())
        }

        async fn media_links(&self, _bot_id: &str) -> ms_domain::error::Result<MediaLinks> {
            let available = self.current.lock().media_available;
            Ok(if available {
                MediaLinks {
                    transcript: Some(MediaEntry {
                        url: "https://cdn.example.com/t.json".into(),
                        expires_at: None,
                    }),
                    ..Default::default()
                }
            } else {
                MediaLinks::default()
            })
        }

        async fn download(&self, _url: &str) -> ms_domain::error::Result<String> {
            Ok("{}".into())
        }
    }

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            join_window_before: Duration::minutes(2),
            max_entry_denials: 3,
            max_kicks: 3,
            join_retry_min: StdDuration::from_secs(1),
            join_retry_max: StdDuration::from_secs(2),
            waiting_room_timeout: StdDuration::from_secs(5),
            reconnect_interval: StdDuration::from_secs(1),
            max_overrun: Duration::minutes(30),
            event_end_grace: Duration::minutes(15),
            status_poll: StdDuration::from_secs(1),
            transcript_poll: StdDuration::from_secs(1),
            // Zero disables the background harvest task in tests.
            transcript_wait: StdDuration::ZERO,
        }
    }

    fn meeting() -> MeetingRef {
        let now = Utc::now();
        MeetingRef {
            event_id: "ev1".into(),
            summary: "Weekly sync".into(),
            meeting_url: "https://meet.google.com/abc-defg-hij".into(),
            start: now,
            end: now + Duration::minutes(30),
        }
    }

    fn supervisor(api: Arc<ScriptedApi>, dir: &tempfile::TempDir) -> Supervisor {
        Supervisor::new(api, StatePaths::new(dir.path()), test_config())
    }

    fn end_event(log: &HistoryLog) -> (u32, u32) {
        for line in log.read_all() {
            if let HistoryEvent::SupervisorEnd {
                denied_count,
                kicked_count,
                ..
            } = line.event
            {
                return (denied_count, kicked_count);
            }
        }
        panic!("no supervisor_end event in history");
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_ends_on_two_signals() {
        let api = ScriptedApi::new(vec![
            step("waiting_for_entry", false),
            step("recording_active", false),
            step("recording_active", false),
            step("meeting_ended", true),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let result = supervisor(api, &dir).supervise(&meeting()).await;

        assert!(result.ok, "{}", result.message);
        assert_eq!(result.failure_code, None);
        assert_eq!(result.attempted_bot_ids, vec!["bot-1"]);
        assert_eq!(result.final_bot_id.as_deref(), Some("bot-1"));
        assert!(result.message.contains("api_reports_ended"));
        assert!(result.message.contains("media_available"));
    }

    #[tokio::test(start_paused = true)]
    async fn one_end_signal_does_not_terminate() {
        // API reports ended but no media and no grace: keep polling, then
        // the second signal (media) arrives.
        let api = ScriptedApi::new(vec![
            step("meeting_ended", false),
            step("meeting_ended", false),
            step("meeting_ended", true),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let result = supervisor(api, &dir).supervise(&meeting()).await;

        assert!(result.ok);
        // Three polls happened: the first two scored one signal only.
        assert!(result.message.contains("signals="));
    }

    #[tokio::test(start_paused = true)]
    async fn denial_cap_yields_join_refused_max() {
        let api = ScriptedApi::new(vec![step("entry_denied", false)]);
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(api, &dir);
        let meeting = meeting();
        let result = sup.supervise(&meeting).await;

        assert!(!result.ok);
        assert_eq!(result.failure_code, Some(FailureCode::JoinRefusedMax));
        assert_eq!(result.attempted_bot_ids.len(), 3, "one bot per denial");

        let log = HistoryLog::new(StatePaths::new(dir.path()).history_log(&meeting.occurrence()));
        assert_eq!(end_event(&log), (3, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn denial_at_two_of_three_still_succeeds() {
        let api = ScriptedApi::new(vec![
            step("entry_denied", false),  // bot-1 denied
            step("entry_denied", false),  // bot-2 denied
            step("recording_active", false), // bot-3 admitted
            step("meeting_ended", true),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(api, &dir);
        let meeting = meeting();
        let result = sup.supervise(&meeting).await;

        assert!(result.ok, "{}", result.message);
        assert_eq!(result.attempted_bot_ids.len(), 3);

        let log = HistoryLog::new(StatePaths::new(dir.path()).history_log(&meeting.occurrence()));
        assert_eq!(end_event(&log), (2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_after_kick() {
        let api = ScriptedApi::new(vec![
            step("recording_active", false),
            step("bot_removed", false),
            step("recording_active", false), // fresh bot
            step("meeting_ended", true),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(api, &dir);
        let meeting = meeting();
        let result = sup.supervise(&meeting).await;

        assert!(result.ok, "{}", result.message);
        assert_eq!(result.attempted_bot_ids, vec!["bot-1", "bot-2"]);
        assert_eq!(result.final_bot_id.as_deref(), Some("bot-2"));

        let log = HistoryLog::new(StatePaths::new(dir.path()).history_log(&meeting.occurrence()));
        assert_eq!(end_event(&log), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn kick_cap_yields_kicked_max() {
        let api = ScriptedApi::new(vec![step("bot_removed", false)]);
        let dir = tempfile::tempdir().unwrap();
        let result = supervisor(api, &dir).supervise(&meeting()).await;

        assert!(!result.ok);
        assert_eq!(result.failure_code, Some(FailureCode::KickedMax));
        assert_eq!(result.attempted_bot_ids.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_after_recording_triggers_rejoin() {
        let api = ScriptedApi::new(vec![
            step("recording_active", false),
            step("disconnected", false),
            step("recording_active", false), // new bot id polls
            step("meeting_ended", true),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let result = supervisor(api, &dir).supervise(&meeting()).await;

        assert!(result.ok, "{}", result.message);
        assert_eq!(result.attempted_bot_ids.len(), 2, "rejoin created a second bot");
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_room_timeout_counts_as_denial() {
        let api = ScriptedApi::new(vec![step("waiting_for_entry", false)]);
        let dir = tempfile::tempdir().unwrap();
        let result = supervisor(api, &dir).supervise(&meeting()).await;

        // Every bot waits out the 5 s room timeout, then counts a denial.
        assert!(!result.ok);
        assert_eq!(result.failure_code, Some(FailureCode::JoinRefusedMax));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_create_is_terminal() {
        let api = ScriptedApi::failing_create(401);
        let dir = tempfile::tempdir().unwrap();
        let result = supervisor(api, &dir).supervise(&meeting()).await;

        assert!(!result.ok);
        assert_eq!(result.failure_code, Some(FailureCode::BotCreateFailed));
        assert!(result.attempted_bot_ids.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_join_supervises_in_progress_meeting() {
        let api = ScriptedApi::new(vec![
            step("recording_active", false),
            step("meeting_ended", true),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let meeting = MeetingRef {
            event_id: "ev-late".into(),
            summary: "Started without us".into(),
            meeting_url: "https://meet.google.com/abc-defg-hij".into(),
            start: now - Duration::minutes(5),
            end: now + Duration::minutes(25),
        };
        let result = supervisor(api, &dir).supervise(&meeting).await;

        assert!(result.ok, "{}", result.message);
        assert_eq!(result.attempted_bot_ids.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_guard_fires_when_grace_is_longer() {
        let api = ScriptedApi::new(vec![step("recording_active", false)]);
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        // Grace beyond the hard stop so the overrun guard is the one
        // that fires.
        config.max_overrun = Duration::seconds(30);
        config.event_end_grace = Duration::minutes(60);
        let now = Utc::now();
        let meeting = MeetingRef {
            event_id: "ev-long".into(),
            summary: "Overrunning".into(),
            meeting_url: "https://meet.google.com/abc-defg-hij".into(),
            start: now,
            end: now + Duration::seconds(30),
        };
        let sup = Supervisor::new(api, StatePaths::new(dir.path()), config);
        let result = sup.supervise(&meeting).await;

        assert!(!result.ok);
        assert_eq!(result.failure_code, Some(FailureCode::MaxDurationExceeded));
    }
}
