use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Calendar polling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Calendar to poll (provider-side id; `"primary"` for the default).
    #[serde(default = "d_primary")]
    pub calendar_id: String,
    /// Base URL of the calendar REST API.
    #[serde(default = "d_calendar_base")]
    pub api_base: String,
    /// Env var holding the OAuth bearer token.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    /// Optional file containing the bearer token (takes precedence when
    /// present; lets deployments mount a refreshed token).
    #[serde(default)]
    pub token_file: Option<std::path::PathBuf>,
    /// Seconds between poll ticks.
    #[serde(default = "d_15")]
    pub poll_seconds: u64,
    /// How far back the listing window reaches, in minutes.
    #[serde(default = "d_120")]
    pub lookback_minutes: i64,
    /// How far ahead the listing window reaches, in minutes.
    #[serde(default = "d_120")]
    pub window_minutes: i64,
    /// Maximum events fetched per tick.
    #[serde(default = "d_50")]
    pub max_results: u32,
    /// Minutes before start when an event becomes joinable.
    #[serde(default = "d_2")]
    pub join_before_minutes: i64,
    /// Minutes after start during which an initial join is still attempted.
    #[serde(default = "d_join_after")]
    pub join_after_minutes: i64,
    /// Conferencing hosts whose URLs we can join (substring match).
    #[serde(default = "d_hosts")]
    pub supported_hosts: Vec<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_id: d_primary(),
            api_base: d_calendar_base(),
            token_env: d_token_env(),
            token_file: None,
            poll_seconds: d_15(),
            lookback_minutes: d_120(),
            window_minutes: d_120(),
            max_results: d_50(),
            join_before_minutes: d_2(),
            join_after_minutes: d_join_after(),
            supported_hosts: d_hosts(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_primary() -> String {
    "primary".into()
}
fn d_calendar_base() -> String {
    "https://www.googleapis.com/calendar/v3".into()
}
fn d_token_env() -> String {
    "MEETSCRIBE_CALENDAR_TOKEN".into()
}
fn d_15() -> u64 {
    15
}
fn d_120() -> i64 {
    120
}
fn d_50() -> u32 {
    50
}
fn d_2() -> i64 {
    2
}
fn d_join_after() -> i64 {
    15
}
fn d_hosts() -> Vec<String> {
    vec![
        "meet.google.com".into(),
        "zoom.us".into(),
        "teams.microsoft.com".into(),
    ]
}
