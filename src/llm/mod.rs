//! LLM provider abstraction and multi-provider routing

pub mod auth;
mod copilot;
mod error;
mod model_id;
pub mod openai_compat;
mod openrouter;
mod registry;
mod types;

pub use copilot::CopilotProvider;
pub use error::LlmError;
pub use model_id::{ModelIdentifier, SEPARATOR};
pub use openrouter::{OpenRouterProvider, OPENROUTER_API_URL, OPENROUTER_MODELS};
pub use registry::{ModelInfo, ProviderRegistry, DEFAULT_PROVIDER, FALLBACK_PROVIDER};
pub use types::*;

use async_trait::async_trait;
use std::time::Duration;

/// A backend able to answer chat completions for a set of models
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique registry key
    fn name(&self) -> &str;

    /// Models advertised for discovery. Not a validation list.
    fn supported_models(&self) -> Vec<String>;

    /// Whether the provider is configured. Must not touch the network.
    fn is_available(&self) -> bool;

    /// Issue one completion request, bounded by `timeout`.
    ///
    /// Remote failures are reported as [`QueryOutcome::Failed`]; `Err` is
    /// reserved for caller contract violations (empty model, no messages).
    async fn query_model(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<QueryOutcome, LlmError>;
}

/// Fold a transport result into an outcome, logging the failure
pub(crate) fn outcome_from(
    provider: &str,
    model: &str,
    result: Result<QueryResult, LlmError>,
) -> QueryOutcome {
    match result {
        Ok(result) => QueryOutcome::Ok(result),
        Err(e) => {
            tracing::warn!(provider, model, "Query failed: {}", e);
            QueryOutcome::failed(e.to_string())
        }
    }
}
