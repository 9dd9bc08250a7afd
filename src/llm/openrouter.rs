//! OpenRouter LLM provider implementation
//!
//! OpenRouter fronts hundreds of models from many vendors behind one
//! OpenAI-compatible API, addressed by vendor-prefixed names
//! (`openai/gpt-4o`, `anthropic/claude-3.5-sonnet`).
//!
//! SECURITY: The API key is ONLY sent to the configured OpenRouter endpoint.

use super::{
    openai_compat::{validate_request, OpenAiCompatClient, OpenAiCompatConfig},
    outcome_from, ChatMessage, LlmError, Provider, QueryOutcome,
};
use async_trait::async_trait;
use std::time::Duration;

/// Official OpenRouter API endpoint
pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Commonly used models. OpenRouter accepts far more; this list is for discovery.
pub const OPENROUTER_MODELS: &[&str] = &[
    "openai/gpt-4o",
    "openai/gpt-4o-mini",
    "openai/o1-preview",
    "openai/o1-mini",
    "anthropic/claude-3.5-sonnet",
    "anthropic/claude-3-opus",
    "google/gemini-pro",
    "google/gemini-2.0-flash-exp",
    "meta-llama/llama-3.1-405b-instruct",
    "x-ai/grok-2",
];

/// Key-based provider: available iff an API key is configured
pub struct OpenRouterProvider {
    inner: OpenAiCompatClient,
    api_key: Option<String>,
    models: Vec<String>,
}

impl OpenRouterProvider {
    pub fn new(client: reqwest::Client, api_url: &str, api_key: Option<String>) -> Self {
        let inner = OpenAiCompatClient::new(
            client,
            OpenAiCompatConfig::new("openrouter", api_url)
                .with_header("HTTP-Referer", "https://github.com/llm-council/llm-council")
                .with_header("X-Title", "LLM Council"),
        );

        Self {
            inner,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            models: OPENROUTER_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        if !models.is_empty() {
            self.models = models;
        }
        self
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn supported_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn query_model(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<QueryOutcome, LlmError> {
        validate_request(model, messages)?;

        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("OpenRouter API key not configured");
            return Ok(QueryOutcome::failed("OpenRouter API key not configured"));
        };

        let result = self.inner.complete(api_key, model, messages, timeout).await;
        Ok(outcome_from(self.name(), model, result))
    }
}
