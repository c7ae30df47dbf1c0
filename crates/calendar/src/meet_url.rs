//! Meeting-URL extraction from raw calendar event payloads.
//!
//! Providers stash the conferencing link in several places; we check
//! them in priority order: the dedicated conferencing field, the
//! conference entry-points list, then free text in the description and
//! location.

use serde_json::Value;

/// Extract a supported conferencing URL from a raw event object.
pub fn extract_meeting_url(event: &Value, supported_hosts: &[String]) -> Option<String> {
    // Dedicated field for provider-created conferences.
    if let Some(link) = event.get("hangoutLink").and_then(Value::as_str) {
        if link.starts_with("http") && host_matches(link, supported_hosts) {
            return Some(link.to_string());
        }
    }

    // Conference entry points of type `video` or `more`.
    if let Some(entry_points) = event
        .pointer("/conferenceData/entryPoints")
        .and_then(Value::as_array)
    {
        for ep in entry_points {
            let ep_type = ep.get("entryPointType").and_then(Value::as_str);
            let uri = ep.get("uri").and_then(Value::as_str);
            if let (Some(ep_type), Some(uri)) = (ep_type, uri) {
                if matches!(ep_type, "video" | "more") && host_matches(uri, supported_hosts) {
                    return Some(uri.to_string());
                }
            }
        }
    }

    // Free text fallbacks.
    for key in ["description", "location"] {
        if let Some(text) = event.get(key).and_then(Value::as_str) {
            if let Some(url) = extract_from_text(text, supported_hosts) {
                return Some(url);
            }
        }
    }

    None
}

fn host_matches(url: &str, supported_hosts: &[String]) -> bool {
    supported_hosts.iter().any(|h| url.contains(h.as_str()))
}

/// Pull the first token containing a supported host out of free text.
fn extract_from_text(text: &str, supported_hosts: &[String]) -> Option<String> {
    for token in text.replace('\n', " ").split(' ') {
        if !host_matches(token, supported_hosts) {
            continue;
        }
        let token = token.trim_matches(|c| "<>[](){}\"'.,;".contains(c));
        if token.is_empty() {
            continue;
        }
        if token.starts_with("http") {
            return Some(token.to_string());
        }
        return Some(format!("https://{token}"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hosts() -> Vec<String> {
        vec!["meet.google.com".into(), "zoom.us".into()]
    }

    #[test]
    fn dedicated_field_wins() {
        let event = json!({
            "hangoutLink": "https://meet.google.com/abc-defg-hij",
            "description": "also see https://meet.google.com/xxx-yyyy-zzz",
        });
        assert_eq!(
            extract_meeting_url(&event, &hosts()).as_deref(),
            Some("https://meet.google.com/abc-defg-hij")
        );
    }

    #[test]
    fn entry_points_video_type() {
        let event = json!({
            "conferenceData": {
                "entryPoints": [
                    {"entryPointType": "phone", "uri": "tel:+1-555-0100"},
                    {"entryPointType": "video", "uri": "https://zoom.us/j/123456"},
                ]
            }
        });
        assert_eq!(
            extract_meeting_url(&event, &hosts()).as_deref(),
            Some("https://zoom.us/j/123456")
        );
    }

    #[test]
    fn description_token_is_cleaned() {
        let event = json!({
            "description": "Join here: <https://meet.google.com/abc-defg-hij>,"
        });
        assert_eq!(
            extract_meeting_url(&event, &hosts()).as_deref(),
            Some("https://meet.google.com/abc-defg-hij")
        );
    }

    #[test]
    fn bare_host_gets_scheme() {
        let event = json!({"location": "meet.google.com/abc-defg-hij"});
        assert_eq!(
            extract_meeting_url(&event, &hosts()).as_deref(),
            Some("https://meet.google.com/abc-defg-hij")
        );
    }

    #[test]
    fn unsupported_host_is_ignored() {
        let event = json!({
            "hangoutLink": "https://example.com/call",
            "description": "https://example.com/other",
        });
        assert_eq!(extract_meeting_url(&event, &hosts()), None);
    }
}
