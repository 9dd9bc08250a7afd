//! Sequences one conversation turn through the three stages and reports
//! progress as an ordered stream of events.

use super::{
    LabelMap, Stage1Response, Stage2Metadata, Stage2Ranking, Stage3Result, StageEngine,
};
use crate::storage::ConversationStore;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleData {
    pub title: String,
}

/// One frame of the turn stream, emitted in declaration order.
/// `Error` may replace any suffix of the sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Stage1Start,
    Stage1Complete {
        data: Vec<Stage1Response>,
    },
    Stage2Start,
    Stage2Complete {
        data: Vec<Stage2Ranking>,
        metadata: Stage2Metadata,
    },
    Stage3Start,
    Stage3Complete {
        data: Stage3Result,
    },
    TitleComplete {
        data: TitleData,
    },
    Complete,
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Stage1Start => "stage1_start",
            StreamEvent::Stage1Complete { .. } => "stage1_complete",
            StreamEvent::Stage2Start => "stage2_start",
            StreamEvent::Stage2Complete { .. } => "stage2_complete",
            StreamEvent::Stage3Start => "stage3_start",
            StreamEvent::Stage3Complete { .. } => "stage3_complete",
            StreamEvent::TitleComplete { .. } => "title_complete",
            StreamEvent::Complete => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Result of a non-streaming turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    pub stage1: Vec<Stage1Response>,
    pub stage2: Vec<Stage2Ranking>,
    pub stage3: Stage3Result,
    pub metadata: Stage2Metadata,
}

/// Aborts the background task if the turn ends before it is joined
struct AbortOnDrop<T>(Option<JoinHandle<T>>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T> {
        match self.0.take() {
            Some(handle) => handle.await.context("Background task failed"),
            None => anyhow::bail!("Background task already joined"),
        }
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Sent when the receiving side has gone away
#[derive(Debug, thiserror::Error)]
#[error("client disconnected")]
struct Disconnected;

async fn emit(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<()> {
    tracing::debug!("Emitting {}", event.kind());
    tx.send(event).await.map_err(|_| Disconnected)?;
    Ok(())
}

#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn StageEngine>,
    store: Arc<dyn ConversationStore>,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn StageEngine>, store: Arc<dyn ConversationStore>) -> Self {
        Self { engine, store }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Run one turn in a background task and stream its events.
    ///
    /// Dropping the stream stops the turn at its next emission.
    pub fn stream_turn(&self, conversation_id: String, content: String) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = self.clone();

        tokio::spawn(async move {
            if let Err(e) = this.run_streaming(&conversation_id, &content, &tx).await {
                if e.downcast_ref::<Disconnected>().is_some() {
                    tracing::info!("Client left conversation {} mid-turn", conversation_id);
                    return;
                }
                tracing::error!("Turn failed for conversation {}: {:#}", conversation_id, e);
                let _ = tx
                    .send(StreamEvent::Error {
                        message: format!("{:#}", e),
                    })
                    .await;
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run_streaming(
        &self,
        conversation_id: &str,
        content: &str,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let conversation = self
            .store
            .get_conversation(conversation_id)?
            .with_context(|| format!("Conversation {} not found", conversation_id))?;
        let is_first_turn = conversation.messages.is_empty();

        self.store.add_user_message(conversation_id, content)?;

        let title_task = is_first_turn.then(|| {
            let engine = self.engine.clone();
            let content = content.to_string();
            AbortOnDrop(Some(tokio::spawn(async move {
                engine.generate_title(&content).await
            })))
        });

        emit(tx, StreamEvent::Stage1Start).await?;
        let stage1 = self.engine.collect_responses(content).await?;
        emit(tx, StreamEvent::Stage1Complete { data: stage1.clone() }).await?;

        emit(tx, StreamEvent::Stage2Start).await?;
        let (stage2, label_to_model) = self.engine.collect_rankings(content, &stage1).await?;
        let metadata = self.metadata(&stage2, label_to_model);
        emit(
            tx,
            StreamEvent::Stage2Complete {
                data: stage2.clone(),
                metadata,
            },
        )
        .await?;

        emit(tx, StreamEvent::Stage3Start).await?;
        let stage3 = self.engine.synthesize_final(content, &stage1, &stage2).await?;
        emit(tx, StreamEvent::Stage3Complete { data: stage3.clone() }).await?;

        if let Some(task) = title_task {
            let title = task.join().await??;
            self.store.update_title(conversation_id, &title)?;
            emit(tx, StreamEvent::TitleComplete { data: TitleData { title } }).await?;
        }

        self.store
            .add_assistant_message(conversation_id, stage1, stage2, stage3)?;

        emit(tx, StreamEvent::Complete).await
    }

    /// Run one turn to completion without streaming.
    ///
    /// On the first turn the title is generated before the stages run.
    pub async fn run_full(&self, conversation_id: &str, content: &str) -> Result<TurnResult> {
        let conversation = self
            .store
            .get_conversation(conversation_id)?
            .with_context(|| format!("Conversation {} not found", conversation_id))?;
        let is_first_turn = conversation.messages.is_empty();

        self.store.add_user_message(conversation_id, content)?;

        if is_first_turn {
            let title = self.engine.generate_title(content).await?;
            self.store.update_title(conversation_id, &title)?;
        }

        let stage1 = self.engine.collect_responses(content).await?;
        let (stage2, label_to_model) = self.engine.collect_rankings(content, &stage1).await?;
        let metadata = self.metadata(&stage2, label_to_model);
        let stage3 = self.engine.synthesize_final(content, &stage1, &stage2).await?;

        self.store.add_assistant_message(
            conversation_id,
            stage1.clone(),
            stage2.clone(),
            stage3.clone(),
        )?;

        Ok(TurnResult {
            stage1,
            stage2,
            stage3,
            metadata,
        })
    }

    fn metadata(&self, stage2: &[Stage2Ranking], label_to_model: LabelMap) -> Stage2Metadata {
        let aggregate_rankings = self
            .engine
            .calculate_aggregate_rankings(stage2, &label_to_model);
        Stage2Metadata {
            label_to_model,
            aggregate_rankings,
        }
    }
}
