//! Read-only calendar client.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use ms_domain::config::CalendarConfig;
use ms_domain::error::{Error, Result};

use crate::event::CalendarEvent;
use crate::meet_url::extract_meeting_url;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Source trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read-only event source. The poller only ever lists a window; the core
/// never writes calendar state.
#[async_trait::async_trait]
pub trait CalendarSource: Send + Sync {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Google Calendar REST client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Google Calendar v3 events client (read-only scope).
///
/// Lists the window with `singleEvents=true` + `orderBy=startTime` so
/// recurring events arrive pre-expanded, and requests
/// `conferenceDataVersion=1` for the entry-points list.
pub struct GoogleCalendarClient {
    base_url: String,
    calendar_id: String,
    max_results: u32,
    token_env: String,
    token_file: Option<std::path::PathBuf>,
    supported_hosts: Vec<String>,
    client: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn from_config(cfg: &CalendarConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: cfg.api_base.trim_end_matches('/').to_string(),
            calendar_id: cfg.calendar_id.clone(),
            max_results: cfg.max_results,
            token_env: cfg.token_env.clone(),
            token_file: cfg.token_file.clone(),
            supported_hosts: cfg.supported_hosts.clone(),
            client,
        })
    }

    /// Resolve the bearer token: mounted token file first, then env.
    fn bearer_token(&self) -> Result<String> {
        if let Some(path) = &self.token_file {
            if let Ok(raw) = std::fs::read_to_string(path) {
                let token = raw.trim();
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
        }
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(Error::Auth(format!(
                "no calendar token: set {} or configure calendar.token_file",
                self.token_env
            ))),
        }
    }
}

#[async_trait::async_trait]
impl CalendarSource for GoogleCalendarClient {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let url = format!("{}/calendars/{}/events", self.base_url, self.calendar_id);
        let token = self.bearer_token()?;

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("maxResults", self.max_results.to_string()),
                ("singleEvents", "true".into()),
                ("orderBy", "startTime".into()),
                ("conferenceDataVersion", "1".into()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Calendar(format!(
                "events.list failed ({status}): {body}"
            )));
        }

        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let events = items
            .iter()
            .filter_map(|item| parse_event(item, &self.supported_hosts))
            .collect();
        Ok(events)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse one raw event item into a snapshot. Items without usable
/// start/end instants are dropped.
pub fn parse_event(item: &Value, supported_hosts: &[String]) -> Option<CalendarEvent> {
    let event_id = item.get("id").and_then(Value::as_str)?.to_string();

    let summary = item
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("(no title)")
        .to_string();

    let (start, start_all_day) = parse_instant(item.get("start")?)?;
    let (end, _) = parse_instant(item.get("end")?)?;

    let status = item
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("confirmed")
        .to_string();

    Some(CalendarEvent {
        event_id,
        summary,
        start,
        end,
        meeting_url: extract_meeting_url(item, supported_hosts),
        status,
        is_all_day: start_all_day,
    })
}

/// A start/end object carries either `dateTime` (RFC3339) or `date`
/// (all-day). Both normalize to a UTC instant; the bool reports all-day.
fn parse_instant(obj: &Value) -> Option<(DateTime<Utc>, bool)> {
    if let Some(raw) = obj.get("dateTime").and_then(Value::as_str) {
        let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
        return Some((parsed.with_timezone(&Utc), false));
    }
    if let Some(raw) = obj.get("date").and_then(Value::as_str) {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
        let instant = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        return Some((instant, true));
    }
    None
}
