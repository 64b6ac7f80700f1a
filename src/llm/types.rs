//! Provider-neutral chat types.
//!
//! Providers differ only in URL, auth, payload shape, and cache-hint
//! semantics; everything upstream-facing is expressed in these types and
//! serialized per-provider at the edge.

use serde::{Deserialize, Serialize};

/// Upstream provider family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions (plain string content).
    OpenAi,
    /// Content-block protocol with explicit cache markers.
    Anthropic,
    /// Aliyun-style generation API (plain string content, nested payload).
    DashScope,
}

impl ProviderKind {
    /// Whether the family understands an explicit cache directive on
    /// content blocks.
    pub fn supports_cache_hint(self) -> bool {
        matches!(self, ProviderKind::Anthropic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Plain text or explicit content blocks, depending on provider family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// One multipart content block with an optional cache marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
            cache_control: None,
        }
    }

    pub fn cached(mut self) -> Self {
        self.cache_control = Some(CacheControl::ephemeral());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            kind: "ephemeral".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// System prompt plus the cache decision made by the prompt builder.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    pub text: String,
    pub cacheable: bool,
}

/// Sampling parameters resolved from the agent's defaults.
#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: i32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Token usage as reported by the provider; either side may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
}

impl Usage {
    /// Keep the latest non-empty value for each side.
    pub fn merge(&mut self, other: Usage) {
        if other.prompt_tokens.is_some() {
            self.prompt_tokens = other.prompt_tokens;
        }
        if other.completion_tokens.is_some() {
            self.completion_tokens = other.completion_tokens;
        }
    }
}

/// One event from an upstream stream. `Done` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Usage(Usage),
    Done,
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_serializes_to_string_content() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn block_content_carries_cache_marker() {
        let block = ContentBlock::text("persona").cached();
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["cache_control"]["type"], "ephemeral");

        let plain = serde_json::to_value(ContentBlock::text("x")).unwrap();
        assert!(plain.get("cache_control").is_none());
    }

    #[test]
    fn usage_merge_keeps_latest_non_empty() {
        let mut usage = Usage {
            prompt_tokens: Some(10),
            completion_tokens: None,
        };
        usage.merge(Usage {
            prompt_tokens: None,
            completion_tokens: Some(42),
        });
        assert_eq!(usage.prompt_tokens, Some(10));
        assert_eq!(usage.completion_tokens, Some(42));
    }

    #[test]
    fn provider_kind_parses_lowercase() {
        let kind: ProviderKind = serde_yaml::from_str("dashscope").unwrap();
        assert_eq!(kind, ProviderKind::DashScope);
        assert!(!kind.supports_cache_hint());
        assert!(ProviderKind::Anthropic.supports_cache_hint());
    }
}
