//! llm-council: ask several LLMs the same question, have them rank each
//! other's answers, and let a chairman model synthesise the result.
//!
//! This library provides:
//! - A provider registry routing `provider/model` identifiers to OpenRouter
//!   (API key) or GitHub Copilot (OAuth device flow)
//! - Parallel and rate-limited sequential fan-out
//! - Encrypted local storage of the Copilot credential
//! - A three-stage council streamed to clients over Server-Sent Events

pub mod config;
pub mod council;
pub mod llm;
pub mod secure_store;
pub mod storage;
pub mod transport;

pub use config::Config;
pub use council::{CouncilEngine, Orchestrator, StageEngine, StreamEvent};
pub use llm::{ProviderRegistry, QueryOutcome};
pub use storage::{ConversationStore, JsonConversationStore};
