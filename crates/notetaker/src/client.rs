//! Bot provider HTTP client.
//!
//! Three operations against the provider's v3 API: create a bot, fetch
//! its history, fetch its media links. Transient failures (429, 5xx,
//! timeouts) retry with jittered back-off; accounts without the
//! grant-scoped routes fall back to the standalone endpoints.

use serde_json::Value;

use ms_domain::config::NotetakerConfig;
use ms_domain::error::{Error, Result};
use ms_domain::retry::RetrySchedule;

use crate::history::latest_status_from_payload;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Most recent state observed in a bot's history.
#[derive(Debug, Clone, Default)]
pub struct LatestStatus {
    pub event_type: Option<String>,
    pub state: Option<String>,
    pub meeting_state: Option<String>,
}

/// One downloadable media artifact.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MediaEntry {
    pub url: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Media links published by the provider after (or during) a meeting.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MediaLinks {
    #[serde(default)]
    pub transcript: Option<MediaEntry>,
    #[serde(default)]
    pub recording: Option<MediaEntry>,
    #[serde(default)]
    pub summary: Option<MediaEntry>,
    #[serde(default)]
    pub action_items: Option<MediaEntry>,
}

impl MediaLinks {
    /// Transcript or recording present counts as "media available" for
    /// end-signal scoring.
    pub fn any_available(&self) -> bool {
        self.transcript.is_some() || self.recording.is_some()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// API trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The provider surface the supervisor and harvester depend on. Tests
/// script this trait instead of the network.
#[async_trait::async_trait]
pub trait NotetakerApi: Send + Sync {
    /// Create a bot for the meeting. Returns the provider's bot id.
    async fn create_bot(&self, meeting_url: &str, join_time: Option<i64>) -> Result<String>;

    /// Most recent observable state for a bot.
    async fn latest_status(&self, bot_id: &str) -> Result<LatestStatus>;

    /// Media links, when published. Absent media is `Ok` with empty links.
    async fn media_links(&self, bot_id: &str) -> Result<MediaLinks>;

    /// Download a media URL as text.
    async fn download(&self, url: &str) -> Result<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpNotetakerClient {
    base_url: String,
    api_key: String,
    grant_id: Option<String>,
    bot_name: String,
    transcription: bool,
    audio_recording: bool,
    retry: RetrySchedule,
    client: reqwest::Client,
}

impl HttpNotetakerClient {
    pub fn from_config(cfg: &NotetakerConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Auth(format!(
                    "missing notetaker API key: set {}",
                    cfg.api_key_env
                ))
            })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: cfg.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            grant_id: cfg.grant_id.clone(),
            bot_name: cfg.bot_name.clone(),
            transcription: cfg.transcription,
            audio_recording: cfg.audio_recording,
            retry: RetrySchedule::default(),
            client,
        })
    }

    fn grant_url(&self, suffix: &str) -> Option<String> {
        self.grant_id
            .as_ref()
            .map(|g| format!("{}/v3/grants/{g}/notetakers{suffix}", self.base_url))
    }

    fn standalone_url(&self, suffix: &str) -> String {
        format!("{}/v3/notetakers{suffix}", self.base_url)
    }

    /// Send with retries for transient failures. Returns the final
    /// status and parsed body; non-retriable 4xx comes back as `Ok` so
    /// callers can inspect the body for route-fallback decisions.
    async fn request_with_retry(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<(reqwest::StatusCode, Value)> {
        let mut attempt: u32 = 0;
        loop {
            let mut builder = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.api_key)
                .header("Accept", "application/json");
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let delay = match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 429 || status.is_server_error() {
                        self.retry.delay_before_retry(attempt)
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        let body = serde_json::from_str(&text)
                            .unwrap_or_else(|_| serde_json::json!({ "text": text }));
                        return Ok((status, body));
                    }
                }
                Err(err) if err.is_timeout() || err.is_connect() => {
                    self.retry.delay_before_retry(attempt)
                }
                Err(err) => return Err(Error::Http(err.to_string())),
            };

            if self.retry.out_of_attempts(attempt) {
                return Err(Error::Timeout(format!(
                    "{method} {url} failed after {} attempts",
                    attempt + 1
                )));
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait::async_trait]
impl NotetakerApi for HttpNotetakerClient {
    async fn create_bot(&self, meeting_url: &str, join_time: Option<i64>) -> Result<String> {
        let mut payload = serde_json::json!({
            "meeting_link": meeting_url,
            "name": self.bot_name,
            "meeting_settings": {
                "transcription": self.transcription,
                "audio_recording": self.audio_recording,
            },
        });
        if let Some(join_time) = join_time {
            payload["join_time"] = serde_json::json!(join_time);
        }

        let url = self
            .grant_url("")
            .unwrap_or_else(|| self.standalone_url(""));
        let (mut status, mut body) = self
            .request_with_retry(reqwest::Method::POST, &url, Some(&payload))
            .await?;

        // Some accounts/regions lack the grant-scoped route entirely; the
        // 404 body says "Cannot POST /v3/grants/...". Retry standalone.
        if self.grant_id.is_some() && status.as_u16() == 404 && is_missing_route(&body) {
            let fallback = self.standalone_url("");
            tracing::debug!(url = %fallback, "grant route missing; using standalone endpoint");
            (status, body) = self
                .request_with_retry(reqwest::Method::POST, &fallback, Some(&payload))
                .await?;
        }

        if !status.is_success() {
            return Err(Error::Notetaker {
                status: status.as_u16(),
                message: format!("create failed: {body}"),
            });
        }

        body.pointer("/data/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Notetaker {
                status: status.as_u16(),
                message: format!("create response missing bot id: {body}"),
            })
    }

    async fn latest_status(&self, bot_id: &str) -> Result<LatestStatus> {
        let suffix = format!("/{bot_id}/history");
        let url = self
            .grant_url(&suffix)
            .unwrap_or_else(|| self.standalone_url(&suffix));
        let (mut status, mut body) = self
            .request_with_retry(reqwest::Method::GET, &url, None)
            .await?;

        // Bots created via the standalone endpoint are invisible to the
        // grant-scoped history route.
        if self.grant_id.is_some() && status.as_u16() == 404 && is_unknown_notetaker(&body) {
            (status, body) = self
                .request_with_retry(reqwest::Method::GET, &self.standalone_url(&suffix), None)
                .await?;
        }

        if !status.is_success() {
            return Err(Error::Notetaker {
                status: status.as_u16(),
                message: format!("history fetch failed: {body}"),
            });
        }

        Ok(latest_status_from_payload(&body))
    }

    async fn media_links(&self, bot_id: &str) -> Result<MediaLinks> {
        let suffix = format!("/{bot_id}/media");
        let url = self
            .grant_url(&suffix)
            .unwrap_or_else(|| self.standalone_url(&suffix));
        let (status, body) = self
            .request_with_retry(reqwest::Method::GET, &url, None)
            .await?;

        // 410 means media expired or was never produced: not an error.
        if status.as_u16() == 410 {
            return Ok(MediaLinks::default());
        }
        if !status.is_success() {
            return Err(Error::Notetaker {
                status: status.as_u16(),
                message: format!("media fetch failed: {body}"),
            });
        }

        Ok(parse_media_links(&body))
    }

    async fn download(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!("download failed ({status}): {url}")));
        }
        response.text().await.map_err(|e| Error::Http(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payload helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn is_missing_route(body: &Value) -> bool {
    body.get("text")
        .and_then(Value::as_str)
        .map(|t| t.contains("Cannot POST") && t.contains("/v3/grants/"))
        .unwrap_or(false)
}

fn is_unknown_notetaker(body: &Value) -> bool {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(|m| m.to_lowercase().contains("notetaker not found"))
        .unwrap_or(false)
}

/// Parse the media map out of a `{"data": {...}}` payload.
pub fn parse_media_links(body: &Value) -> MediaLinks {
    let data = body.get("data").unwrap_or(body);

    let pick = |key: &str| -> Option<MediaEntry> {
        let entry = data.get(key)?;
        let url = entry.get("url").and_then(Value::as_str)?;
        if !url.starts_with("http") {
            return None;
        }
        Some(MediaEntry {
            url: url.to_string(),
            expires_at: entry.get("expires_at").and_then(Value::as_i64),
        })
    };

    MediaLinks {
        transcript: pick("transcript"),
        recording: pick("recording"),
        summary: pick("summary"),
        action_items: pick("action_items"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn media_links_parse_and_score() {
        let body = json!({
            "data": {
                "transcript": {"url": "https://cdn.example.com/t.json", "expires_at": 123},
                "recording": {"url": "not-a-url"},
            }
        });
        let links = parse_media_links(&body);
        assert!(links.transcript.is_some());
        assert!(links.recording.is_none(), "non-http urls are dropped");
        assert!(links.any_available());

        assert!(!parse_media_links(&json!({"data": {}})).any_available());
    }

    #[test]
    fn route_fallback_detection() {
        let body = json!({"text": "Cannot POST /v3/grants/g1/notetakers"});
        assert!(is_missing_route(&body));
        assert!(!is_missing_route(&json!({"text": "Cannot POST /v3/other"})));

        let body = json!({"error": {"message": "Notetaker not found."}});
        assert!(is_unknown_notetaker(&body));
    }
}
