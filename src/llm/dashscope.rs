//! Aliyun-style generation family: plain string content, nested
//! input/parameters payload, SSE enabled via header.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use super::provider::{LlmProvider, ProviderError, UpstreamRequest, truncate_body};
use super::sse::{EventStream, decode_events};
use super::types::{ChatRole, ProviderKind, StreamEvent, Usage};

const GENERATION_PATH: &str = "/api/v1/services/aigc/text-generation/generation";

pub struct DashScopeProvider {
    http: reqwest::Client,
}

impl DashScopeProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// Request body for the generation endpoint.
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
        "input": {"messages": messages},
        "parameters": {
            "result_format": "message",
            "incremental_output": true,
            "temperature": req.params.temperature,
            "max_tokens": req.params.max_tokens,
            "top_p": req.params.top_p,
        },
    })
}

/// Parse one `data:` payload. A final chunk can carry both trailing text
/// and the stop marker, so this may yield more than one event.
pub fn parse_data(payload: &str) -> Vec<StreamEvent> {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    let choice = value.pointer("/output/choices/0");

    if let Some(text) = choice
        .and_then(|c| c.pointer("/message/content"))
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            events.push(StreamEvent::Delta(text.to_string()));
        }
    }

    if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
        events.push(StreamEvent::Usage(Usage {
            prompt_tokens: usage.get("input_tokens").and_then(Value::as_i64),
            completion_tokens: usage.get("output_tokens").and_then(Value::as_i64),
        }));
    }

    if let Some(code) = value.get("code").and_then(Value::as_str) {
        if !code.is_empty() {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(code);
            return vec![StreamEvent::Error(message.to_string())];
        }
    }

    let finished = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .map(|r| r == "stop")
        .unwrap_or(false);
    if finished {
        events.push(StreamEvent::Done);
    }

    events
}

#[async_trait]
impl LlmProvider for DashScopeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DashScope
    }

    async fn open_stream(&self, req: &UpstreamRequest) -> Result<EventStream, ProviderError> {
        let api_key = req.model.resolve_api_key();
        if api_key.is_empty() {
            return Err(ProviderError::MissingApiKey(req.model.code.clone()));
        }

        let url = format!("{}{}", req.model.base_url.trim_end_matches('/'), GENERATION_PATH);
        let resp = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .header("X-DashScope-SSE", "enable")
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
                code: "spark-turbo".into(),
                provider: ProviderKind::DashScope,
                upstream_model: "qwen-plus".into(),
                base_url: "https://dashscope.aliyuncs.com".into(),
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
                text: "sys".into(),
                cacheable: false,
            }),
            messages: vec![ChatMessage::user("hi")],
            params: SamplingParams::default(),
        }
    }

    #[test]
    fn payload_nests_messages_under_input() {
        let payload = build_payload(&request());
        assert_eq!(payload["input"]["messages"][0]["role"], "system");
        assert_eq!(payload["parameters"]["incremental_output"], true);
        assert_eq!(payload["parameters"]["result_format"], "message");
    }

    #[test]
    fn final_chunk_yields_delta_then_done() {
        let payload = r#"{"output":{"choices":[{"message":{"role":"assistant","content":"bye"},"finish_reason":"stop"}]},"usage":{"input_tokens":3,"output_tokens":9}}"#;
        let events = parse_data(payload);
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("bye".to_string()),
                StreamEvent::Usage(Usage {
                    prompt_tokens: Some(3),
                    completion_tokens: Some(9),
                }),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn mid_stream_chunk_yields_delta_only() {
        let payload = r#"{"output":{"choices":[{"message":{"content":"he"},"finish_reason":"null"}]}}"#;
        assert_eq!(parse_data(payload), vec![StreamEvent::Delta("he".to_string())]);
    }

    #[test]
    fn error_payload_maps_to_error_event() {
        let payload = r#"{"code":"Throttling","message":"rate limited"}"#;
        assert_eq!(
            parse_data(payload),
            vec![StreamEvent::Error("rate limited".to_string())]
        );
    }
}
