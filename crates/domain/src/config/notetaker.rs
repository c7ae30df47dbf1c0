use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Notetaker provider + supervisor timings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotetakerConfig {
    /// Base URL of the bot provider API.
    #[serde(default = "d_api_base")]
    pub api_base: String,
    /// Env var holding the provider API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Tenant grant id; when set, grant-scoped endpoints are preferred.
    #[serde(default)]
    pub grant_id: Option<String>,
    /// Display name the bot joins with.
    #[serde(default = "d_bot_name")]
    pub bot_name: String,
    /// Ask the provider for a transcript.
    #[serde(default = "d_true")]
    pub transcription: bool,
    /// Ask the provider for an audio recording.
    #[serde(default = "d_true")]
    pub audio_recording: bool,

    // ── Supervisor timings ─────────────────────────────────────────
    /// Seconds between history polls while supervising.
    #[serde(default = "d_15")]
    pub status_poll_seconds: u64,
    /// Minimum delay between bot-create attempts, seconds.
    #[serde(default = "d_30")]
    pub join_retry_min_seconds: u64,
    /// Maximum delay between bot-create attempts, seconds.
    #[serde(default = "d_60")]
    pub join_retry_max_seconds: u64,
    /// How long one bot may sit in the waiting room, seconds.
    #[serde(default = "d_300")]
    pub waiting_room_timeout_seconds: u64,
    /// Delay before a rejoin attempt after a disconnect, seconds.
    #[serde(default = "d_30")]
    pub reconnect_interval_seconds: u64,
    /// Host denials tolerated before giving up.
    #[serde(default = "d_3")]
    pub max_entry_denials: u32,
    /// Removals/kicks tolerated before giving up.
    #[serde(default = "d_3")]
    pub max_kicks: u32,
    /// Hard stop: seconds past the scheduled end.
    #[serde(default = "d_1800")]
    pub max_overrun_seconds: i64,
    /// Seconds past the scheduled end that count as an end signal.
    #[serde(default = "d_900")]
    pub event_end_grace_seconds: i64,

    // ── Harvester ──────────────────────────────────────────────────
    /// Seconds between media polls after a run ends.
    #[serde(default = "d_20")]
    pub transcript_poll_seconds: u64,
    /// Total seconds to wait for a transcript after a run ends.
    #[serde(default = "d_1200")]
    pub transcript_wait_seconds: u64,
}

impl Default for NotetakerConfig {
    fn default() -> Self {
        Self {
            api_base: d_api_base(),
            api_key_env: d_api_key_env(),
            grant_id: None,
            bot_name: d_bot_name(),
            transcription: true,
            audio_recording: true,
            status_poll_seconds: d_15(),
            join_retry_min_seconds: d_30(),
            join_retry_max_seconds: d_60(),
            waiting_room_timeout_seconds: d_300(),
            reconnect_interval_seconds: d_30(),
            max_entry_denials: d_3(),
            max_kicks: d_3(),
            max_overrun_seconds: d_1800(),
            event_end_grace_seconds: d_900(),
            transcript_poll_seconds: d_20(),
            transcript_wait_seconds: d_1200(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_api_base() -> String {
    "https://api.us.nylas.com".into()
}
fn d_api_key_env() -> String {
    "MEETSCRIBE_NOTETAKER_KEY".into()
}
fn d_bot_name() -> String {
    "MeetScribe Recorder".into()
}
fn d_true() -> bool {
    true
}
fn d_15() -> u64 {
    15
}
fn d_20() -> u64 {
    20
}
fn d_30() -> u64 {
    30
}
fn d_60() -> u64 {
    60
}
fn d_300() -> u64 {
    300
}
fn d_1200() -> u64 {
    1200
}
fn d_3() -> u32 {
    3
}
fn d_1800() -> i64 {
    1800
}
fn d_900() -> i64 {
    900
}
