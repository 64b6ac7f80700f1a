//! Uniform streaming interface over upstream LLM provider families.
//!
//! - [`types`] - Provider-neutral message/content/usage types
//! - [`sse`] - Owned SSE byte decoder (partial codepoints, buffered blobs)
//! - [`provider`] - `LlmProvider` trait + config-driven model registry
//! - [`openai`] / [`anthropic`] / [`dashscope`] - the three families

pub mod anthropic;
pub mod dashscope;
pub mod openai;
pub mod provider;
pub mod sse;
pub mod types;

pub use provider::{LlmProvider, ModelRegistry, ProviderError, UpstreamRequest};
pub use sse::{EventStream, SseLineBuffer};
pub use types::{
    CacheControl, ChatMessage, ChatRole, ContentBlock, MessageContent, ProviderKind,
    SamplingParams, StreamEvent, SystemPrompt, Usage,
};
