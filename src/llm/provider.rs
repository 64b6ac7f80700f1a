//! Uniform streaming interface over provider families plus the model
//! registry resolved from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::anthropic::AnthropicProvider;
use super::dashscope::DashScopeProvider;
use super::openai::OpenAiProvider;
use super::sse::EventStream;
use super::types::{ChatMessage, ProviderKind, SamplingParams, SystemPrompt};
use crate::config::ModelConfig;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model {0} has no API key configured")]
    MissingApiKey(String),
}

/// Cap error bodies carried into logs and error frames.
pub(crate) fn truncate_body(body: String) -> String {
    const MAX: usize = 500;
    if body.chars().count() <= MAX {
        body
    } else {
        body.chars().take(MAX).collect()
    }
}

/// Everything a provider needs to open one upstream stream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub model: ModelConfig,
    pub system: Option<SystemPrompt>,
    pub messages: Vec<ChatMessage>,
    pub params: SamplingParams,
}

/// One provider family. Implementations differ only in URL, auth, payload
/// shape, and cache-hint serialization.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Open the upstream SSE stream. Dropping the returned stream aborts
    /// the upstream connection, not just the forwarding.
    async fn open_stream(&self, req: &UpstreamRequest) -> Result<EventStream, ProviderError>;
}

/// Model registry: config-declared models bound to their provider family.
pub struct ModelRegistry {
    models: FxHashMap<String, ModelConfig>,
    providers: FxHashMap<ProviderKind, Arc<dyn LlmProvider>>,
}

impl ModelRegistry {
    pub fn new(models: &[ModelConfig]) -> Result<Self, reqwest::Error> {
        let connect_timeout = models
            .iter()
            .map(|m| m.connect_timeout_ms)
            .min()
            .unwrap_or(5_000);
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(connect_timeout))
            .build()?;

        let mut providers: FxHashMap<ProviderKind, Arc<dyn LlmProvider>> = FxHashMap::default();
        providers.insert(
            ProviderKind::OpenAi,
            Arc::new(OpenAiProvider::new(http.clone())),
        );
        providers.insert(
            ProviderKind::Anthropic,
            Arc::new(AnthropicProvider::new(http.clone())),
        );
        providers.insert(
            ProviderKind::DashScope,
            Arc::new(DashScopeProvider::new(http)),
        );

        Ok(Self {
            models: models
                .iter()
                .map(|m| (m.code.clone(), m.clone()))
                .collect(),
            providers,
        })
    }

    pub fn model(&self, code: &str) -> Option<&ModelConfig> {
        self.models.get(code)
    }

    /// Open a stream for a platform model code.
    pub async fn open_stream(
        &self,
        code: &str,
        system: Option<SystemPrompt>,
        messages: Vec<ChatMessage>,
        params: SamplingParams,
    ) -> Result<EventStream, ProviderError> {
        let model = self
            .models
            .get(code)
            .ok_or_else(|| ProviderError::UnknownModel(code.to_string()))?;
        let provider = self
            .providers
            .get(&model.provider)
            .ok_or_else(|| ProviderError::UnknownModel(code.to_string()))?;

        let req = UpstreamRequest {
            model: model.clone(),
            system,
            messages,
            params,
        };
        provider.open_stream(&req).await
    }
}
