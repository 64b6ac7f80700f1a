//! Content-block provider family with explicit cache markers.
//!
//! The only family that takes multipart content; the prompt builder's cache
//! decision is serialized as a `cache_control` marker on the system block.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use super::provider::{LlmProvider, ProviderError, UpstreamRequest, truncate_body};
use super::sse::{EventStream, decode_events};
use super::types::{ChatRole, ContentBlock, ProviderKind, StreamEvent, Usage};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// Request body for `POST {base}/v1/messages`.
pub fn build_payload(req: &UpstreamRequest) -> Value {
    let messages: Vec<Value> = req
        .messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| {
            let role = match m.role {
                ChatRole::Assistant => "assistant",
                _ => "user",
            };
            let blocks = vec![ContentBlock::text(m.content.as_text())];
            json!({"role": role, "content": blocks})
        })
        .collect();

    let mut payload = json!({
        "model": req.model.upstream_model,
        "max_tokens": req.params.max_tokens,
        "messages": messages,
        "stream": true,
        "temperature": req.params.temperature,
        "top_p": req.params.top_p,
    });

    if let Some(system) = &req.system {
        let block = if system.cacheable {
            ContentBlock::text(&system.text).cached()
        } else {
            ContentBlock::text(&system.text)
        };
        payload["system"] = json!([block]);
    }

    payload
}

/// Parse one `data:` payload, dispatching on the event `type`.
pub fn parse_data(payload: &str) -> Vec<StreamEvent> {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    match value.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(|t| vec![StreamEvent::Delta(t.to_string())])
            .unwrap_or_default(),
        Some("message_start") => value
            .pointer("/message/usage/input_tokens")
            .and_then(Value::as_i64)
            .map(|n| {
                vec![StreamEvent::Usage(Usage {
                    prompt_tokens: Some(n),
                    completion_tokens: None,
                })]
            })
            .unwrap_or_default(),
        Some("message_delta") => value
            .pointer("/usage/output_tokens")
            .and_then(Value::as_i64)
            .map(|n| {
                vec![StreamEvent::Usage(Usage {
                    prompt_tokens: None,
                    completion_tokens: Some(n),
                })]
            })
            .unwrap_or_default(),
        Some("message_stop") => vec![StreamEvent::Done],
        Some("error") => {
            let message = value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("upstream error");
            vec![StreamEvent::Error(message.to_string())]
        }
        _ => Vec::new(),
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn open_stream(&self, req: &UpstreamRequest) -> Result<EventStream, ProviderError> {
        let api_key = req.model.resolve_api_key();
        if api_key.is_empty() {
            return Err(ProviderError::MissingApiKey(req.model.code.clone()));
        }

        let url = format!("{}/v1/messages", req.model.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&build_payload(req))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        Ok(decode_events(resp.bytes_stream().boxed(), parse_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::llm::types::{ChatMessage, SamplingParams, SystemPrompt};

    fn request(cacheable: bool) -> UpstreamRequest {
        UpstreamRequest {
            model: ModelConfig {
                code: "spark-pro".into(),
                provider: ProviderKind::Anthropic,
                upstream_model: "claude-sonnet-4-5".into(),
                base_url: "https://api.anthropic.com".into(),
                api_key_env: String::new(),
                api_key: "k".into(),
                multiplier: rust_decimal::Decimal::ONE,
                k_in: rust_decimal::Decimal::ONE,
                k_out: rust_decimal::Decimal::ONE,
                max_output_tokens: 1024,
                connect_timeout_ms: 1000,
                read_timeout_ms: 1000,
                total_deadline_ms: 1000,
            },
            system: Some(SystemPrompt {
                text: "persona".into(),
                cacheable,
            }),
            messages: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            params: SamplingParams::default(),
        }
    }

    #[test]
    fn cacheable_system_carries_cache_control() {
        let payload = build_payload(&request(true));
        assert_eq!(payload["system"][0]["cache_control"]["type"], "ephemeral");
        assert_eq!(payload["messages"][0]["content"][0]["type"], "text");
    }

    #[test]
    fn plain_system_has_no_cache_control() {
        let payload = build_payload(&request(false));
        assert!(payload["system"][0].get("cache_control").is_none());
    }

    #[test]
    fn parses_delta_usage_and_stop() {
        assert_eq!(
            parse_data(r#"{"type":"content_block_delta","delta":{"text":"hi"}}"#),
            vec![StreamEvent::Delta("hi".to_string())]
        );
        assert_eq!(
            parse_data(r#"{"type":"message_delta","usage":{"output_tokens":7}}"#),
            vec![StreamEvent::Usage(Usage {
                prompt_tokens: None,
                completion_tokens: Some(7),
            })]
        );
        assert_eq!(parse_data(r#"{"type":"message_stop"}"#), vec![StreamEvent::Done]);
        assert!(parse_data(r#"{"type":"ping"}"#).is_empty());
    }

    #[test]
    fn parses_error_event() {
        let events = parse_data(r#"{"type":"error","error":{"message":"overloaded"}}"#);
        assert_eq!(events, vec![StreamEvent::Error("overloaded".to_string())]);
    }
}
