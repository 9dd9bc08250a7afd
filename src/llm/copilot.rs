//! GitHub Copilot LLM provider
//!
//! Uses the device-flow credentials held by [`CopilotAuth`]: every query first
//! obtains a current Copilot API token, then calls the OpenAI-compatible
//! Copilot chat endpoint with the editor identification headers.

use super::{
    auth::{CopilotAuth, COPILOT_HEADERS, COPILOT_MODELS},
    openai_compat::{validate_request, OpenAiCompatClient, OpenAiCompatConfig},
    outcome_from, ChatMessage, LlmError, Provider, QueryOutcome,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// OAuth-backed provider: available iff an access token is stored
pub struct CopilotProvider {
    auth: Arc<CopilotAuth>,
    inner: OpenAiCompatClient,
    models: Vec<String>,
}

impl CopilotProvider {
    pub fn new(auth: Arc<CopilotAuth>) -> Self {
        let inner = OpenAiCompatClient::new(
            auth.client().clone(),
            OpenAiCompatConfig::new("copilot", auth.endpoints().chat_url.clone())
                .with_headers(COPILOT_HEADERS),
        );

        Self {
            auth,
            inner,
            models: COPILOT_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Restrict or extend the advertised models; empty keeps the built-in list
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        if !models.is_empty() {
            self.models = models;
        }
        self
    }
}

#[async_trait]
impl Provider for CopilotProvider {
    fn name(&self) -> &str {
        "copilot"
    }

    fn supported_models(&self) -> Vec<String> {
        self.models.clone()
    }

    /// Local credential presence only; revocation surfaces on the first query
    fn is_available(&self) -> bool {
        self.auth.is_authenticated()
    }

    async fn query_model(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<QueryOutcome, LlmError> {
        validate_request(model, messages)?;

        let Some(api_token) = self.auth.get_api_token().await else {
            tracing::warn!("No Copilot API token available. Please authenticate first.");
            return Ok(QueryOutcome::failed(
                "No Copilot API token available; authenticate first",
            ));
        };

        let result = self.inner.complete(&api_token, model, messages, timeout).await;
        Ok(outcome_from(self.name(), model, result))
    }
}
