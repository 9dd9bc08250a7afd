//! End-to-end turn streaming, in-process and over HTTP/SSE

use anyhow::Result;
use async_trait::async_trait;
use llm_council::council::{
    AggregateRanking, LabelMap, Stage1Response, Stage2Ranking, Stage3Result,
};
use llm_council::storage::StoredMessage;
use llm_council::transport::{router, AppState};
use llm_council::{Config, ConversationStore, JsonConversationStore, Orchestrator, StageEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

/// Deterministic engine; the title is slower than every stage so it must
/// be awaited after stage 3
struct FakeEngine;

#[async_trait]
impl StageEngine for FakeEngine {
    async fn collect_responses(&self, content: &str) -> Result<Vec<Stage1Response>> {
        Ok(vec![
            Stage1Response {
                model: "copilot/gpt-4o".into(),
                response: format!("gpt says {}", content),
            },
            Stage1Response {
                model: "openai/gpt-4o-mini".into(),
                response: "mini says hi".into(),
            },
        ])
    }

    async fn collect_rankings(
        &self,
        _content: &str,
        stage1: &[Stage1Response],
    ) -> Result<(Vec<Stage2Ranking>, LabelMap)> {
        let labels: LabelMap = [
            ("Response A".to_string(), stage1[0].model.clone()),
            ("Response B".to_string(), stage1[1].model.clone()),
        ]
        .into_iter()
        .collect();
        let ranking = Stage2Ranking {
            model: "copilot/gpt-4o".into(),
            ranking: "FINAL RANKING:\n1. Response B\n2. Response A".into(),
            parsed_ranking: vec!["Response B".into(), "Response A".into()],
        };
        Ok((vec![ranking], labels))
    }

    async fn synthesize_final(
        &self,
        _content: &str,
        _stage1: &[Stage1Response],
        _stage2: &[Stage2Ranking],
    ) -> Result<Stage3Result> {
        Ok(Stage3Result {
            model: "copilot/gpt-4o".into(),
            response: "the council agrees".into(),
        })
    }

    fn calculate_aggregate_rankings(
        &self,
        stage2: &[Stage2Ranking],
        label_to_model: &LabelMap,
    ) -> Vec<AggregateRanking> {
        llm_council::council::aggregate_rankings(stage2, label_to_model)
    }

    async fn generate_title(&self, _content: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok("Greeting The Council".into())
    }
}

const EXPECTED_ORDER: [&str; 8] = [
    "stage1_start",
    "stage1_complete",
    "stage2_start",
    "stage2_complete",
    "stage3_start",
    "stage3_complete",
    "title_complete",
    "complete",
];

#[tokio::test]
async fn test_fresh_conversation_event_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonConversationStore::new(dir.path()).unwrap());
    store.create_conversation("conv-1").unwrap();
    let orchestrator = Orchestrator::new(Arc::new(FakeEngine), store.clone());

    let events: Vec<_> = orchestrator
        .stream_turn("conv-1".into(), "hello".into())
        .collect()
        .await;
    let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, EXPECTED_ORDER);

    let conversation = store.get_conversation("conv-1").unwrap().unwrap();
    assert_eq!(conversation.title, "Greeting The Council");
    assert_eq!(conversation.messages.len(), 2);
    match &conversation.messages[1] {
        StoredMessage::Assistant { stage1, stage2, stage3 } => {
            assert_eq!(stage1.len(), 2);
            assert_eq!(stage2.len(), 1);
            assert_eq!(stage3.response, "the council agrees");
        }
        other => panic!("expected assistant message, got {:?}", other),
    }
}

async fn spawn_server(data_dir: &std::path::Path) -> String {
    let mut config = Config::default();
    config.storage.data_dir = Some(data_dir.to_path_buf());
    config.openrouter.api_key = None;

    let state = AppState::from_config(config).unwrap();
    let store: Arc<dyn ConversationStore> = state.orchestrator.store().clone();
    let state = state.with_orchestrator(Orchestrator::new(Arc::new(FakeEngine), store));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::new(state))).await.unwrap();
    });
    format!("http://{}", addr)
}

fn sse_frames(body: &str) -> Vec<serde_json::Value> {
    body.split("\n\n")
        .filter_map(|block| {
            block
                .lines()
                .find_map(|line| line.strip_prefix("data:"))
                .map(|data| serde_json::from_str(data.trim()).unwrap())
        })
        .collect()
}

#[tokio::test]
async fn test_sse_stream_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;
    let client = reqwest::Client::new();

    let conversation: serde_json::Value = client
        .post(format!("{}/api/conversations", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = conversation["id"].as_str().unwrap().to_string();
    assert_eq!(conversation["title"], "New Conversation");

    let response = client
        .post(format!("{}/api/conversations/{}/message/stream", base, id))
        .json(&serde_json::json!({"content": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let frames = sse_frames(&response.text().await.unwrap());
    let kinds: Vec<_> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, EXPECTED_ORDER);

    let stage2 = &frames[3];
    assert_eq!(stage2["metadata"]["label_to_model"]["Response B"], "openai/gpt-4o-mini");
    assert_eq!(
        stage2["metadata"]["aggregate_rankings"][0]["model"],
        "openai/gpt-4o-mini"
    );
    assert_eq!(frames[6]["data"]["title"], "Greeting The Council");

    let stored: serde_json::Value = client
        .get(format!("{}/api/conversations/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_conversation_is_404_before_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/conversations/does-not-exist/message/stream", base))
        .json(&serde_json::json!({"content": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_non_streaming_message() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;
    let client = reqwest::Client::new();

    let conversation: serde_json::Value = client
        .post(format!("{}/api/conversations", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = conversation["id"].as_str().unwrap();

    let result: serde_json::Value = client
        .post(format!("{}/api/conversations/{}/message", base, id))
        .json(&serde_json::json!({"content": "hello"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["stage3"]["response"], "the council agrees");
    assert!(result["metadata"]["label_to_model"].is_object());

    let list: serde_json::Value = client
        .get(format!("{}/api/conversations", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list[0]["title"], "Greeting The Council");
    assert_eq!(list[0]["message_count"], 2);
}
