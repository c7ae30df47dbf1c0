//! OpenAI-compatible chat adapter.
//!
//! Works with any endpoint following the OpenAI chat completions
//! contract (Groq, OpenAI, vLLM, Together, ...). Supports strict
//! JSON-object responses and tool calling; retries transient failures
//! with jittered exponential back-off.

use std::sync::Arc;

use serde_json::Value;

use ms_domain::config::LlmConfig;
use ms_domain::error::{Error, Result};
use ms_domain::retry::RetrySchedule;

use crate::limiter::{estimate_tokens, RateLimiter};
use crate::types::{ChatRequest, ChatResponse, LlmClient, Role, ToolCall};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatClient {
    base_url: String,
    model: String,
    api_key: String,
    retry: RetrySchedule,
    limiter: Arc<RateLimiter>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Build the adapter from config; the API key is resolved from the
    /// configured env var once, at construction.
    pub fn from_config(cfg: &LlmConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Auth(format!("missing LLM API key: set {}", cfg.api_key_env)))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key: api_key.trim().to_string(),
            retry: RetrySchedule {
                budget: cfg.max_attempts,
                ..RetrySchedule::default()
            },
            limiter,
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        // Tool-calling responses are not JSON objects, so the two modes
        // are mutually exclusive.
        if req.json_mode && req.tools.is_empty() {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&req);

        let est = estimate_tokens(req.prompt_chars()) + req.max_tokens.unwrap_or(32).max(32);
        self.limiter.acquire(est).await;

        let mut attempt: u32 = 0;
        loop {
            let outcome = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let delay = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let payload: Value = response
                            .json()
                            .await
                            .map_err(|e| Error::Http(e.to_string()))?;
                        return parse_chat_response(&payload);
                    }

                    if status.as_u16() == 429 {
                        retry_after(&response)
                            .unwrap_or_else(|| self.retry.delay_before_retry(attempt))
                    } else if status.is_server_error() {
                        self.retry.delay_before_retry(attempt)
                    } else {
                        // Non-retriable 4xx: auth/payload problem.
                        let text = response.text().await.unwrap_or_default();
                        return Err(Error::Llm(format!("chat failed ({status}): {text}")));
                    }
                }
                Err(err) if err.is_timeout() || err.is_connect() => {
                    self.retry.delay_before_retry(attempt)
                }
                Err(err) => return Err(Error::Http(err.to_string())),
            };

            if self.retry.out_of_attempts(attempt) {
                return Err(Error::Llm(format!(
                    "chat failed after {} attempts",
                    attempt + 1
                )));
            }
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying chat");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn retry_after(response: &reqwest::Response) -> Option<std::time::Duration> {
    let raw = response.headers().get("retry-after")?.to_str().ok()?;
    let seconds: u64 = raw.trim().parse().ok()?;
    Some(std::time::Duration::from_secs(seconds))
}

/// Parse an OpenAI-style chat completion payload.
pub fn parse_chat_response(payload: &Value) -> Result<ChatResponse> {
    let message = payload
        .pointer("/choices/0/message")
        .ok_or_else(|| Error::Llm(format!("malformed chat response: {payload}")))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let name = call.pointer("/function/name")?.as_str()?.to_string();
                    let raw_args = call
                        .pointer("/function/arguments")
                        .and_then(Value::as_str)
                        .unwrap_or("{}");
                    let arguments = serde_json::from_str(raw_args)
                        .unwrap_or_else(|_| Value::String(raw_args.to_string()));
                    Some(ToolCall {
                        id: call
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let finish_reason = payload
        .pointer("/choices/0/finish_reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_text_response() {
        let payload = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "{\"facts\": []}"},
                "finish_reason": "stop"
            }]
        });
        let resp = parse_chat_response(&payload).unwrap();
        assert_eq!(resp.content, "{\"facts\": []}");
        assert!(!resp.has_tool_calls());
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn parses_tool_calls_with_json_arguments() {
        let payload = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "insert_extracted_facts",
                            "arguments": "{\"rows\": []}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let resp = parse_chat_response(&payload).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "insert_extracted_facts");
        assert_eq!(resp.tool_calls[0].arguments, json!({"rows": []}));
    }

    #[test]
    fn unparsable_arguments_become_raw_string() {
        let payload = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "t", "arguments": "not json"}
                    }]
                }
            }]
        });
        let resp = parse_chat_response(&payload).unwrap();
        assert_eq!(resp.tool_calls[0].arguments, json!("not json"));
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(parse_chat_response(&json!({"error": "x"})).is_err());
    }
}
