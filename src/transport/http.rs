//! HTTP API for the council: Copilot auth, provider discovery,
//! conversations, and streamed turns over Server-Sent Events

use crate::config::Config;
use crate::council::{CouncilEngine, Orchestrator, StageEngine};
use crate::llm::auth::CopilotAuth;
use crate::llm::ProviderRegistry;
use crate::storage::{ConversationStore, JsonConversationStore};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Process-wide services shared by every request
pub struct AppState {
    pub config: Config,
    pub auth: Arc<CopilotAuth>,
    pub registry: Arc<ProviderRegistry>,
    pub orchestrator: Orchestrator,
}

impl AppState {
    /// Wire up the built-in providers, the council engine and JSON storage
    pub fn from_config(config: Config) -> Result<Self> {
        let data_dir = config.data_dir();
        let client = reqwest::Client::new();

        let auth = Arc::new(
            CopilotAuth::new(client.clone(), config.copilot.endpoints(), &data_dir)
                .with_api_token_ttl(config.copilot.api_token_ttl()),
        );
        let registry = Arc::new(ProviderRegistry::with_defaults(&config, client, auth.clone()));
        let engine: Arc<dyn StageEngine> =
            Arc::new(CouncilEngine::new(registry.clone(), config.council.clone()));
        let store: Arc<dyn ConversationStore> = Arc::new(JsonConversationStore::new(&data_dir)?);

        Ok(Self {
            config,
            auth,
            registry,
            orchestrator: Orchestrator::new(engine, store),
        })
    }

    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    fn store(&self) -> &Arc<dyn ConversationStore> {
        self.orchestrator.store()
    }
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    device_code: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    content: String,
}

#[derive(Debug, Serialize)]
struct ProviderStatus {
    name: String,
    available: bool,
    models: Vec<String>,
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Conversation not found")
}

/// Build the router; separated from `run_http_server` so tests can bind it
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(health_check))
        .route("/api/copilot/status", get(copilot_status))
        .route("/api/copilot/auth", post(copilot_auth))
        .route("/api/copilot/token", post(copilot_token))
        .route("/api/copilot/logout", post(copilot_logout))
        .route("/api/providers", get(list_providers))
        .route("/api/models", get(list_models))
        .route("/api/council/config", get(council_config))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/conversations/:id/message", post(send_message))
        .route("/api/conversations/:id/message/stream", post(send_message_stream))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Run the HTTP server
pub async fn run_http_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = Arc::new(AppState::from_config(config)?);
    let app = router(state);

    tracing::info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "LLM Council API" }))
}

async fn copilot_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let authenticated = state.auth.is_authenticated();
    let available_models: Vec<String> = match (authenticated, state.registry.get("copilot")) {
        (true, Some(provider)) => provider
            .supported_models()
            .into_iter()
            .map(|m| format!("copilot/{}", m))
            .collect(),
        _ => Vec::new(),
    };

    Json(json!({
        "authenticated": authenticated,
        "available_models": available_models,
    }))
}

async fn copilot_auth(State(state): State<Arc<AppState>>) -> Response {
    match state.auth.request_device_code().await {
        Ok(device) => Json(device).into_response(),
        Err(e) => {
            tracing::error!("Device code request failed: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to start authentication: {}", e),
            )
        }
    }
}

/// Blocks until the device flow resolves. A client disconnect drops this
/// future and with it the poll loop.
async fn copilot_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Response {
    let copilot = &state.config.copilot;
    match state
        .auth
        .poll_for_access_token(&req.device_code, copilot.poll_interval(), copilot.poll_max_attempts)
        .await
    {
        Ok(result) => Json(json!({
            "success": result.is_success(),
            "message": result.message(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Device flow polling failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn copilot_logout(State(state): State<Arc<AppState>>) -> Response {
    match state.auth.logout().await {
        Ok(()) => Json(json!({ "success": true, "message": "Logged out successfully" }))
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderStatus>> {
    let providers = state
        .registry
        .list_providers()
        .into_iter()
        .filter_map(|name| state.registry.get(&name))
        .map(|p| {
            let available = p.is_available();
            ProviderStatus {
                name: p.name().to_string(),
                available,
                // Unavailable providers advertise nothing they could serve
                models: if available { p.supported_models() } else { Vec::new() },
            }
        })
        .collect();
    Json(providers)
}

async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    Json(state.registry.available_models()).into_response()
}

async fn council_config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models_of = |name: &str| {
        state
            .registry
            .get(name)
            .map(|p| p.supported_models())
            .unwrap_or_default()
    };
    let council = &state.config.council;

    Json(json!({
        "council_models": council.models,
        "chairman_model": council.chairman_model,
        "title_model": council.title_model,
        "copilot_models": models_of("copilot"),
        "openrouter_models": models_of("openrouter"),
    }))
}

async fn list_conversations(State(state): State<Arc<AppState>>) -> Response {
    match state.store().list_conversations() {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn create_conversation(State(state): State<Arc<AppState>>) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    match state.store().create_conversation(&id) {
        Ok(conversation) => Json(conversation).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn get_conversation(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.store().get_conversation(&id) {
        Ok(Some(conversation)) => Json(conversation).into_response(),
        Ok(None) => not_found(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// 404 / 400 checks shared by both message endpoints
fn check_turn(state: &AppState, id: &str, content: &str) -> Option<Response> {
    match state.store().get_conversation(id) {
        Ok(Some(_)) => {}
        Ok(None) => return Some(not_found()),
        Err(e) => return Some(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
    if content.trim().is_empty() {
        return Some(error_response(
            StatusCode::BAD_REQUEST,
            "Message content must not be empty",
        ));
    }
    None
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    if let Some(rejection) = check_turn(&state, &id, &req.content) {
        return rejection;
    }

    match state.orchestrator.run_full(&id, &req.content).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::error!("Turn failed for conversation {}: {:#}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn send_message_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    if let Some(rejection) = check_turn(&state, &id, &req.content) {
        return rejection;
    }

    let events = state
        .orchestrator
        .stream_turn(id, req.content)
        .map(|event| Event::default().json_data(&event));

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}
