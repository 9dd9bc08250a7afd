//! Provider registry and fan-out strategies

use super::{
    auth::CopilotAuth, ChatMessage, CopilotProvider, ModelIdentifier, OpenRouterProvider,
    Provider, QueryOutcome,
};
use crate::config::Config;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Provider for bare model names
pub const DEFAULT_PROVIDER: &str = "copilot";
/// Provider for identifiers whose prefix is not a registered provider
pub const FALLBACK_PROVIDER: &str = "openrouter";

/// Catalogue entry for model discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Identifier accepted by [`ProviderRegistry::query_model`]
    pub id: String,
    pub provider: String,
    pub name: String,
}

/// Holds every provider for the process lifetime and routes model ids to them
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registry with the built-in OpenRouter and Copilot providers
    pub fn with_defaults(config: &Config, client: reqwest::Client, auth: Arc<CopilotAuth>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(
            OpenRouterProvider::new(
                client,
                &config.openrouter.api_url,
                config.openrouter.resolved_api_key(),
            )
            .with_models(config.openrouter.models.clone()),
        ));
        registry.register(Arc::new(
            CopilotProvider::new(auth).with_models(config.copilot.models.clone()),
        ));
        registry
    }

    /// Add or replace a provider under its own name
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        tracing::debug!("Registered provider {}", name);
        self.providers.insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_available_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .iter()
            .filter(|(_, p)| p.is_available())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn parse_model_identifier(&self, id: &str) -> Result<ModelIdentifier, super::LlmError> {
        ModelIdentifier::parse(
            id,
            |prefix| self.providers.contains_key(prefix),
            DEFAULT_PROVIDER,
            FALLBACK_PROVIDER,
        )
    }

    /// Models of every available provider
    pub fn available_models(&self) -> Vec<ModelInfo> {
        let mut models = Vec::new();
        for name in self.list_available_providers() {
            let Some(provider) = self.providers.get(&name) else {
                continue;
            };
            for model in provider.supported_models() {
                // Fallback models are already vendor-prefixed and route back to it
                let id = if name == FALLBACK_PROVIDER {
                    model.clone()
                } else {
                    format!("{}{}{}", name, super::SEPARATOR, model)
                };
                models.push(ModelInfo {
                    id,
                    provider: name.clone(),
                    name: model,
                });
            }
        }
        models
    }

    /// Route one query. Never errors: unknown or unavailable providers,
    /// contract violations and timeouts all become `Failed`.
    pub async fn query_model(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> QueryOutcome {
        let target = match self.parse_model_identifier(model_id) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!("Invalid model identifier {:?}: {}", model_id, e);
                return QueryOutcome::failed(e.to_string());
            }
        };

        let Some(provider) = self.providers.get(&target.provider) else {
            tracing::warn!("Unknown provider: {}", target.provider);
            return QueryOutcome::failed(format!("Unknown provider: {}", target.provider));
        };

        if !provider.is_available() {
            tracing::warn!("Provider {} is not available/configured", target.provider);
            return QueryOutcome::failed(format!(
                "Provider {} is not available",
                target.provider
            ));
        }

        tracing::debug!(provider = %target.provider, model = %target.model, "Routing query");

        match tokio::time::timeout(
            timeout,
            provider.query_model(&target.model, messages, timeout),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!("Query to {} rejected: {}", model_id, e);
                QueryOutcome::failed(e.to_string())
            }
            Err(_) => {
                tracing::warn!("Query to {} timed out after {:?}", model_id, timeout);
                QueryOutcome::failed(format!("Timed out after {:?}", timeout))
            }
        }
    }

    /// Query every identifier concurrently; each appears once in the result
    pub async fn query_models_parallel(
        &self,
        model_ids: &[String],
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> HashMap<String, QueryOutcome> {
        let futures = model_ids
            .iter()
            .map(|id| async move { (id.clone(), self.query_model(id, messages, timeout).await) });
        join_all(futures).await.into_iter().collect()
    }

    /// Query identifiers one at a time in input order, waiting `delay`
    /// between queries (not before the first)
    pub async fn query_models_sequential(
        &self,
        model_ids: &[String],
        messages: &[ChatMessage],
        timeout: Duration,
        delay: Duration,
    ) -> HashMap<String, QueryOutcome> {
        let mut responses = HashMap::with_capacity(model_ids.len());
        for (i, id) in model_ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            let outcome = self.query_model(id, messages, timeout).await;
            responses.insert(id.clone(), outcome);
        }
        responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, QueryResult};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Scripted provider: answers with the model name, fails or hangs on request
    struct MockProvider {
        name: &'static str,
        available: bool,
        fail: Vec<&'static str>,
        hang: Vec<&'static str>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl MockProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                available: true,
                fail: vec![],
                hang: vec![],
                calls: Mutex::new(vec![]),
            }
        }

        fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn supported_models(&self) -> Vec<String> {
            vec!["m1".into(), "m2".into()]
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn query_model(
            &self,
            model: &str,
            _messages: &[ChatMessage],
            _timeout: Duration,
        ) -> Result<QueryOutcome, LlmError> {
            if model.is_empty() {
                return Err(LlmError::BadRequest("empty model".into()));
            }
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), Instant::now()));
            if self.hang.iter().any(|m| *m == model) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail.iter().any(|m| *m == model) {
                return Ok(QueryOutcome::failed("HTTP 500"));
            }
            Ok(QueryOutcome::Ok(QueryResult::text(format!("{}:{}", self.name, model))))
        }
    }

    fn registry_with(providers: Vec<Arc<MockProvider>>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for p in providers {
            registry.register(p);
        }
        registry
    }

    fn msgs() -> Vec<ChatMessage> {
        vec![ChatMessage::user("question")]
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_routing_through_parser() {
        let copilot = Arc::new(MockProvider::new("copilot"));
        let openrouter = Arc::new(MockProvider::new("openrouter"));
        let registry = registry_with(vec![copilot.clone(), openrouter.clone()]);

        let outcome = registry
            .query_model("gpt-4o", &msgs(), Duration::from_secs(1))
            .await;
        assert_eq!(outcome.result().unwrap().content.as_deref(), Some("copilot:gpt-4o"));

        let outcome = registry
            .query_model("openai/gpt-4o", &msgs(), Duration::from_secs(1))
            .await;
        assert_eq!(
            outcome.result().unwrap().content.as_deref(),
            Some("openrouter:openai/gpt-4o")
        );
    }

    #[tokio::test]
    async fn test_unknown_and_unavailable_fail_soft() {
        let mut offline = MockProvider::new("openrouter");
        offline.available = false;
        let offline = Arc::new(offline);
        let registry = registry_with(vec![offline.clone()]);

        // Bare name routes to the unregistered default provider
        let outcome = registry
            .query_model("gpt-4o", &msgs(), Duration::from_secs(1))
            .await;
        assert!(outcome.failure_reason().unwrap().contains("Unknown provider"));

        let outcome = registry
            .query_model("openai/gpt-4o", &msgs(), Duration::from_secs(1))
            .await;
        assert!(outcome.failure_reason().unwrap().contains("not available"));
        assert!(offline.calls().is_empty());

        let outcome = registry.query_model("", &msgs(), Duration::from_secs(1)).await;
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn test_provider_contract_error_becomes_failed() {
        let registry = registry_with(vec![Arc::new(MockProvider::new("copilot"))]);
        let outcome = registry
            .query_model("copilot/", &msgs(), Duration::from_secs(1))
            .await;
        assert!(outcome.failure_reason().unwrap().contains("Bad request"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_isolates_failures() {
        let mut copilot = MockProvider::new("copilot");
        copilot.fail = vec!["bad"];
        copilot.hang = vec!["slow"];
        let registry = registry_with(vec![Arc::new(copilot)]);

        let models = ids(&["copilot/a", "copilot/bad", "copilot/slow", "copilot/b"]);
        let results = registry
            .query_models_parallel(&models, &msgs(), Duration::from_secs(5))
            .await;

        assert_eq!(results.len(), 4);
        assert!(results["copilot/a"].is_ok());
        assert!(results["copilot/b"].is_ok());
        assert!(!results["copilot/bad"].is_ok());
        assert!(results["copilot/slow"]
            .failure_reason()
            .unwrap()
            .contains("Timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_runs_concurrently() {
        let mut copilot = MockProvider::new("copilot");
        copilot.hang = vec!["x", "y", "z"];
        let registry = registry_with(vec![Arc::new(copilot)]);

        let start = Instant::now();
        let results = registry
            .query_models_parallel(&ids(&["x", "y", "z"]), &msgs(), Duration::from_secs(10))
            .await;

        assert_eq!(results.len(), 3);
        // Three timeouts in parallel cost one timeout, not three
        assert!(start.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_order_and_delays() {
        let copilot = Arc::new(MockProvider::new("copilot"));
        let registry = registry_with(vec![copilot.clone()]);
        let delay = Duration::from_millis(1000);

        let models = ids(&["m1", "m2", "m3", "m4"]);
        let start = Instant::now();
        let results = registry
            .query_models_sequential(&models, &msgs(), Duration::from_secs(5), delay)
            .await;

        assert_eq!(results.len(), 4);
        assert!(results.values().all(QueryOutcome::is_ok));

        let calls = copilot.calls();
        let order: Vec<_> = calls.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(order, vec!["m1", "m2", "m3", "m4"]);

        // No delay before the first call, then N-1 gaps of at least `delay`
        assert!(calls[0].1 - start < delay);
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= delay);
        }
        assert!(start.elapsed() >= delay * 3);
        assert!(start.elapsed() < delay * 4);
    }

    #[tokio::test]
    async fn test_duplicate_ids_collapse() {
        let registry = registry_with(vec![Arc::new(MockProvider::new("copilot"))]);
        let results = registry
            .query_models_parallel(&ids(&["m1", "m1"]), &msgs(), Duration::from_secs(1))
            .await;
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_catalogue_ids() {
        let mut offline = MockProvider::new("other");
        offline.available = false;
        let registry = registry_with(vec![
            Arc::new(MockProvider::new("copilot")),
            Arc::new(MockProvider::new("openrouter")),
            Arc::new(offline),
        ]);

        assert_eq!(registry.list_providers(), vec!["copilot", "openrouter", "other"]);
        assert_eq!(registry.list_available_providers(), vec!["copilot", "openrouter"]);

        let ids: Vec<String> = registry.available_models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["copilot/m1", "copilot/m2", "m1", "m2"]);
        assert!(registry.get("other").is_some());
        assert!(registry.get("missing").is_none());
    }
}
