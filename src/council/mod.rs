//! Three-stage council deliberation
//!
//! Stage 1 collects independent answers, stage 2 has every member rank the
//! anonymised answers, stage 3 lets a chairman model synthesise the result.
//! [`Orchestrator`] sequences one turn and streams its progress.

mod engine;
mod orchestrator;
mod ranking;
mod types;

pub use engine::{clean_title, CouncilEngine, StageEngine};
pub use orchestrator::{Orchestrator, StreamEvent, TitleData, TurnResult};
pub use ranking::{aggregate_rankings, parse_ranking, response_label};
pub use types::*;
