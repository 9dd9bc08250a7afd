//! Stage outputs exchanged between the engine, the orchestrator and storage

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One council member's answer to the user's question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Response {
    pub model: String,
    pub response: String,
}

/// One council member's evaluation of the anonymised answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Ranking {
    pub model: String,
    /// Full evaluation text
    pub ranking: String,
    /// Labels in ranked order, best first (`"Response A"`, ...)
    pub parsed_ranking: Vec<String>,
}

/// The chairman's synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage3Result {
    pub model: String,
    pub response: String,
}

/// Average position a model received across all peer rankings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRanking {
    pub model: String,
    pub average_rank: f64,
    pub rankings_count: usize,
}

/// `"Response A"` → model id
pub type LabelMap = HashMap<String, String>;

/// Metadata attached to the stage 2 completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage2Metadata {
    pub label_to_model: LabelMap,
    pub aggregate_rankings: Vec<AggregateRanking>,
}
