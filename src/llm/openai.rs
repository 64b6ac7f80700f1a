//! OpenAI-compatible chat completions family (plain string content).

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use super::provider::{LlmProvider, ProviderError, UpstreamRequest, truncate_body};
use super::sse::{EventStream, decode_events};
use super::types::{ChatRole, ProviderKind, StreamEvent, Usage};

pub struct OpenAiProvider {
    http: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// Request body for `POST {base}/chat/completions`.
pub fn build_payload(req: &UpstreamRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        messages.push(json!({"role": "system", "content": system.text}));
    }
    for msg in &req.messages {
        let role = match msg.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        messages.push(json!({"role": role, "content": msg.content.as_text()}));
    }

    json!({
        "model": req.model.upstream_model,
        "messages": messages,
        "stream": true,
        "stream_options": {"include_usage": true},
        "temperature": req.params.temperature,
        "max_tokens": req.params.max_tokens,
        "top_p": req.params.top_p,
        "frequency_penalty": req.params.frequency_penalty,
        "presence_penalty": req.params.presence_penalty,
    })
}

/// Parse one `data:` payload.
pub fn parse_data(payload: &str) -> Vec<StreamEvent> {
    if payload.trim() == "[DONE]" {
        return vec![StreamEvent::Done];
    }
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    if let Some(delta) = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        if !delta.is_empty() {
            events.push(StreamEvent::Delta(delta.to_string()));
        }
    }
    if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
        events.push(StreamEvent::Usage(Usage {
            prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_i64),
            completion_tokens: usage.get("completion_tokens").and_then(Value::as_i64),
        }));
    }
    events
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn open_stream(&self, req: &UpstreamRequest) -> Result<EventStream, ProviderError> {
        let api_key = req.model.resolve_api_key();
        if api_key.is_empty() {
            return Err(ProviderError::MissingApiKey(req.model.code.clone()));
        }

        let url = format!("{}/chat/completions", req.model.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .bearer_auth(api_key)
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

    fn request() -> UpstreamRequest {
        UpstreamRequest {
            model: ModelConfig {
                code: "spark-lite".into(),
                provider: ProviderKind::OpenAi,
                upstream_model: "gpt-4o-mini".into(),
                base_url: "https://api.openai.com/v1".into(),
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
                text: "be helpful".into(),
                cacheable: false,
            }),
            messages: vec![ChatMessage::user("hi")],
            params: SamplingParams::default(),
        }
    }

    #[test]
    fn payload_puts_system_first_as_plain_string() {
        let payload = build_payload(&request());
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][0]["content"], "be helpful");
        assert_eq!(payload["messages"][1]["content"], "hi");
        assert_eq!(payload["stream"], true);
    }

    #[test]
    fn parses_delta_and_done() {
        let events = parse_data(r#"{"choices":[{"delta":{"content":"hel"}}]}"#);
        assert_eq!(events, vec![StreamEvent::Delta("hel".to_string())]);
        assert_eq!(parse_data("[DONE]"), vec![StreamEvent::Done]);
        assert!(parse_data("not json").is_empty());
    }

    #[test]
    fn parses_trailing_usage_chunk() {
        let events =
            parse_data(r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34}}"#);
        assert_eq!(
            events,
            vec![StreamEvent::Usage(Usage {
                prompt_tokens: Some(12),
                completion_tokens: Some(34),
            })]
        );
    }
}
