//! The three deliberation stages and title generation

use super::ranking::{aggregate_rankings, parse_ranking, response_label};
use super::{AggregateRanking, LabelMap, Stage1Response, Stage2Ranking, Stage3Result};
use crate::config::{CouncilConfig, FanOut};
use crate::llm::{ChatMessage, ProviderRegistry, QueryOutcome};
use crate::storage::DEFAULT_TITLE;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const TITLE_MAX_CHARS: usize = 50;

/// What each deliberation stage does. The orchestrator only sequences these.
#[async_trait]
pub trait StageEngine: Send + Sync {
    /// Stage 1: independent answers from every council member
    async fn collect_responses(&self, content: &str) -> Result<Vec<Stage1Response>>;

    /// Stage 2: anonymised peer review. Returns the rankings and the
    /// label → model mapping used to anonymise.
    async fn collect_rankings(
        &self,
        content: &str,
        stage1: &[Stage1Response],
    ) -> Result<(Vec<Stage2Ranking>, LabelMap)>;

    /// Stage 3: chairman's final answer
    async fn synthesize_final(
        &self,
        content: &str,
        stage1: &[Stage1Response],
        stage2: &[Stage2Ranking],
    ) -> Result<Stage3Result>;

    fn calculate_aggregate_rankings(
        &self,
        stage2: &[Stage2Ranking],
        label_to_model: &LabelMap,
    ) -> Vec<AggregateRanking>;

    async fn generate_title(&self, content: &str) -> Result<String>;
}

/// Council backed by the provider registry
pub struct CouncilEngine {
    registry: Arc<ProviderRegistry>,
    config: CouncilConfig,
}

impl CouncilEngine {
    pub fn new(registry: Arc<ProviderRegistry>, config: CouncilConfig) -> Self {
        Self { registry, config }
    }

    async fn fan_out(&self, messages: &[ChatMessage]) -> HashMap<String, QueryOutcome> {
        let timeout = self.config.query_timeout();
        match self.config.fan_out {
            FanOut::Parallel => {
                self.registry
                    .query_models_parallel(&self.config.models, messages, timeout)
                    .await
            }
            FanOut::Sequential => {
                self.registry
                    .query_models_sequential(
                        &self.config.models,
                        messages,
                        timeout,
                        self.config.sequential_delay(),
                    )
                    .await
            }
        }
    }

    /// Non-empty answers, in council order
    fn answers(&self, mut outcomes: HashMap<String, QueryOutcome>) -> Vec<(String, String)> {
        let mut answers = Vec::new();
        for model in &self.config.models {
            let Some(outcome) = outcomes.remove(model) else {
                continue;
            };
            match outcome {
                QueryOutcome::Ok(result) => match result.non_empty_content() {
                    Some(text) => answers.push((model.clone(), text.to_string())),
                    None => tracing::debug!("{} returned an empty answer", model),
                },
                QueryOutcome::Failed { reason } => {
                    tracing::debug!("{} dropped from council: {}", model, reason)
                }
            }
        }
        answers
    }
}

fn ranking_prompt(question: &str, labelled: &[(String, &Stage1Response)]) -> String {
    let responses = labelled
        .iter()
        .map(|(label, r)| format!("{}:\n{}", label, r.response))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are evaluating different responses to the following question:\n\n\
         Question: {question}\n\n\
         Here are the responses from different models (anonymized):\n\n\
         {responses}\n\n\
         Evaluate each response individually: what it does well and what it does poorly.\n\n\
         Then, at the very end of your answer, give your final ranking in EXACTLY this format:\n\
         - A line reading \"FINAL RANKING:\"\n\
         - The responses from best to worst as a numbered list\n\
         - Each line is the number, a period, a space, and ONLY the label (e.g. \"1. Response A\")\n\n\
         Example:\n\n\
         FINAL RANKING:\n\
         1. Response C\n\
         2. Response A\n\
         3. Response B"
    )
}

fn chairman_prompt(question: &str, stage1: &[Stage1Response], stage2: &[Stage2Ranking]) -> String {
    let answers = stage1
        .iter()
        .map(|r| format!("Model: {}\nResponse: {}", r.model, r.response))
        .collect::<Vec<_>>()
        .join("\n\n");
    let rankings = stage2
        .iter()
        .map(|r| format!("Model: {}\nRanking: {}", r.model, r.ranking))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are the Chairman of an LLM Council. Several models answered a question \
         and then ranked each other's answers.\n\n\
         Original Question: {question}\n\n\
         STAGE 1 - Individual Responses:\n{answers}\n\n\
         STAGE 2 - Peer Rankings:\n{rankings}\n\n\
         Synthesize all of this into a single, comprehensive, accurate answer to the \
         original question. Weigh the individual responses, the peer rankings, and any \
         points of agreement or disagreement. Answer the question directly."
    )
}

fn title_prompt(question: &str) -> String {
    format!(
        "Generate a very short title (3-5 words maximum) that summarizes the following question.\n\
         The title should be concise and descriptive. Do not use quotes or punctuation in the title.\n\n\
         Question: {question}\n\n\
         Title:"
    )
}

/// Strip quotes and clamp to [`TITLE_MAX_CHARS`]
pub fn clean_title(raw: &str) -> String {
    let title = raw.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = title.chars().take(TITLE_MAX_CHARS - 3).collect();
        return format!("{}...", truncated);
    }
    title.to_string()
}

#[async_trait]
impl StageEngine for CouncilEngine {
    async fn collect_responses(&self, content: &str) -> Result<Vec<Stage1Response>> {
        let outcomes = self.fan_out(&[ChatMessage::user(content)]).await;
        let responses: Vec<Stage1Response> = self
            .answers(outcomes)
            .into_iter()
            .map(|(model, response)| Stage1Response { model, response })
            .collect();

        if responses.is_empty() {
            anyhow::bail!("All council models failed to respond. Please try again.");
        }
        tracing::info!("Stage 1: {} of {} models answered", responses.len(), self.config.models.len());
        Ok(responses)
    }

    async fn collect_rankings(
        &self,
        content: &str,
        stage1: &[Stage1Response],
    ) -> Result<(Vec<Stage2Ranking>, LabelMap)> {
        let labelled: Vec<(String, &Stage1Response)> = stage1
            .iter()
            .enumerate()
            .map(|(i, r)| (response_label(i), r))
            .collect();
        let label_to_model: LabelMap = labelled
            .iter()
            .map(|(label, r)| (label.clone(), r.model.clone()))
            .collect();

        let prompt = ranking_prompt(content, &labelled);
        let outcomes = self.fan_out(&[ChatMessage::user(prompt)]).await;

        let rankings = self
            .answers(outcomes)
            .into_iter()
            .map(|(model, ranking)| Stage2Ranking {
                parsed_ranking: parse_ranking(&ranking),
                model,
                ranking,
            })
            .collect::<Vec<_>>();

        tracing::info!("Stage 2: {} rankings collected", rankings.len());
        Ok((rankings, label_to_model))
    }

    async fn synthesize_final(
        &self,
        content: &str,
        stage1: &[Stage1Response],
        stage2: &[Stage2Ranking],
    ) -> Result<Stage3Result> {
        let chairman = &self.config.chairman_model;
        let prompt = chairman_prompt(content, stage1, stage2);
        let outcome = self
            .registry
            .query_model(chairman, &[ChatMessage::user(prompt)], self.config.query_timeout())
            .await;

        let response = match outcome.result().and_then(|r| r.non_empty_content()) {
            Some(text) => text.to_string(),
            None => {
                tracing::warn!(
                    "Chairman {} produced no answer: {}",
                    chairman,
                    outcome.failure_reason().unwrap_or("empty response")
                );
                "Error: Unable to generate final synthesis.".to_string()
            }
        };

        Ok(Stage3Result {
            model: chairman.clone(),
            response,
        })
    }

    fn calculate_aggregate_rankings(
        &self,
        stage2: &[Stage2Ranking],
        label_to_model: &LabelMap,
    ) -> Vec<AggregateRanking> {
        aggregate_rankings(stage2, label_to_model)
    }

    async fn generate_title(&self, content: &str) -> Result<String> {
        let outcome = self
            .registry
            .query_model(
                &self.config.title_model,
                &[ChatMessage::user(title_prompt(content))],
                self.config.title_timeout(),
            )
            .await;

        Ok(match outcome.result().and_then(|r| r.non_empty_content()) {
            Some(raw) => clean_title(raw),
            None => DEFAULT_TITLE.to_string(),
        })
    }
}
