//! OpenAI-compatible chat completions client
//!
//! Both built-in backends (OpenRouter and GitHub Copilot) speak the OpenAI
//! `/chat/completions` format; they differ only in URL, bearer credential,
//! and a handful of identification headers.
//!
//! SECURITY: Credentials are only sent to the configured endpoint.

use super::{ChatMessage, LlmError, QueryResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Endpoint configuration for an OpenAI-compatible backend
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Provider name, used in log lines
    pub name: String,
    /// Full URL of the chat completions endpoint
    pub base_url: String,
    /// Headers sent with every request
    pub custom_headers: Vec<(String, String)>,
}

impl OpenAiCompatConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            custom_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        for (name, value) in headers {
            self.custom_headers.push((name.to_string(), value.to_string()));
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_details: Option<serde_json::Value>,
}

/// Reject requests that can never succeed before touching the network
pub fn validate_request(model: &str, messages: &[ChatMessage]) -> Result<(), LlmError> {
    if model.trim().is_empty() {
        return Err(LlmError::BadRequest(
            "model name must not be empty".to_string(),
        ));
    }
    if messages.is_empty() {
        return Err(LlmError::BadRequest(
            "at least one message is required".to_string(),
        ));
    }
    Ok(())
}

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(client: reqwest::Client, config: OpenAiCompatConfig) -> Self {
        Self { client, config }
    }

    /// Issue one non-streaming completion with the given bearer credential
    pub async fn complete(
        &self,
        bearer: &str,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<QueryResult, LlmError> {
        let body = OpenAiRequest { model, messages };

        let mut req = self
            .client
            .post(&self.config.base_url)
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Content-Type", "application/json");
        for (name, value) in &self.config.custom_headers {
            req = req.header(name, value);
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, text));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("response has no choices".to_string()))?;

        tracing::debug!(
            provider = %self.config.name,
            model,
            "completion received"
        );

        Ok(QueryResult {
            content: choice.message.content,
            reasoning_details: choice.message.reasoning_details,
        })
    }
}
