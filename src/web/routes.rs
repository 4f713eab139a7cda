//! HTTP routes for the local web UI
//!
//! The chat stream route renders relay events as server-sent events; the
//! remaining routes are JSON CRUD over conversations and configuration.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::config::Config;
use crate::export::{self, ExportFormat};
use crate::relay::{Relay, RelayEvent};
use crate::storage::ConversationStore;

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    /// Shared configuration; POST /api/config replaces the contents
    pub config: Arc<RwLock<Config>>,
    /// Where configuration updates are persisted
    pub config_path: Arc<String>,
    /// The streaming relay
    pub relay: Arc<Relay>,
    /// Conversation storage
    pub store: Arc<dyn ConversationStore>,
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/chat/stream", get(chat_stream))
        .route(
            "/api/conversations",
            get(list_conversations),
        )
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/conversations/:id/export", get(export_conversation))
        .route("/api/config", get(get_config).post(update_config))
        .with_state(state)
}

/// GET /api/ping - liveness probe
async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct ChatStreamParams {
    #[serde(default)]
    message: String,
    conversation_id: Option<String>,
    model: Option<String>,
}

/// GET /api/chat/stream - run one relay cycle as an SSE stream
///
/// Creates a new conversation when no id is supplied. The event order is
/// `{conversation_id}` first, `{content}` fragments, then either a single
/// `{error}` or the `[DONE]` sentinel.
async fn chat_stream(
    State(state): State<AppState>,
    Query(params): Query<ChatStreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<RelayEvent>(64);

    if params.message.trim().is_empty() {
        let _ = tx
            .send(RelayEvent::Error {
                kind: crate::relay::RelayErrorKind::Upstream,
                message: "No message provided".to_string(),
            })
            .await;
        drop(tx);
    } else {
        let conversation_id = match params.conversation_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                let config = state.config.read().await;
                state
                    .store
                    .create(None, &config.api.model, config.context.window)
                    .unwrap_or_else(|e| {
                        tracing::warn!("Failed to create conversation: {}", e);
                        // The relay's append will create the record on first use.
                        chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string()
                    })
            }
        };

        let relay = state.relay.clone();
        let message = params.message.clone();
        let model = params.model.clone();
        tokio::spawn(async move {
            relay
                .run(&message, &conversation_id, model.as_deref(), tx)
                .await;
        });
    }

    let stream =
        ReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(sse_event(event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Renders a relay event as an SSE data payload
fn sse_event(event: RelayEvent) -> Event {
    match event {
        RelayEvent::Conversation { id } => {
            Event::default().data(serde_json::json!({ "conversation_id": id }).to_string())
        }
        RelayEvent::Content { text } => {
            Event::default().data(serde_json::json!({ "content": text }).to_string())
        }
        RelayEvent::Error { message, .. } => {
            Event::default().data(serde_json::json!({ "error": message }).to_string())
        }
        RelayEvent::Done => Event::default().data("[DONE]"),
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_list_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    search: Option<String>,
}

fn default_list_limit() -> usize {
    50
}

/// GET /api/conversations - list summaries, most recently updated first
async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let summaries = state
        .store
        .list(params.limit, params.offset, params.search.as_deref())?;
    Ok(Json(serde_json::json!({ "conversations": summaries })))
}

/// GET /api/conversations/:id - full conversation record
async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = state
        .store
        .get_conversation(&id)?
        .ok_or_else(|| AppError::NotFound("Conversation not found".into()))?;
    Ok(Json(serde_json::to_value(record).map_err(anyhow::Error::from)?))
}

/// DELETE /api/conversations/:id
async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.delete(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    #[serde(default = "default_export_format")]
    format: String,
}

fn default_export_format() -> String {
    "json".to_string()
}

/// GET /api/conversations/:id/export - download a transcript
async fn export_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let format = ExportFormat::parse(&params.format)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let record = state
        .store
        .get_conversation(&id)?
        .ok_or_else(|| AppError::NotFound("Conversation not found".into()))?;
    let body = export::render(&record, format)?;

    let filename = format!("conversation_{}.{}", id, format.extension());
    let response = (
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        body,
    )
        .into_response();
    Ok(response)
}

/// GET /api/config - active configuration with the credential redacted
async fn get_config(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let config = state.config.read().await.clone();
    let mut value = serde_json::to_value(&config).map_err(anyhow::Error::from)?;
    if let Some(key) = value.pointer_mut("/api/key") {
        if key.as_str().map(|s| !s.is_empty()).unwrap_or(false) {
            *key = serde_json::Value::String("********".to_string());
        }
    }
    Ok(Json(value))
}

/// POST /api/config - merge updates, validate, persist, and swap in
async fn update_config(
    State(state): State<AppState>,
    Json(updates): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let current = state.config.read().await.clone();
    let mut merged = serde_json::to_value(&current).map_err(anyhow::Error::from)?;
    merge_json(&mut merged, &updates);

    let new_config: Config = serde_json::from_value(merged)
        .map_err(|e| AppError::BadRequest(format!("Invalid configuration: {}", e)))?;
    new_config
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if let Err(e) = new_config.save(&state.config_path) {
        tracing::warn!("Failed to persist config update: {}", e);
    }
    *state.config.write().await = new_config;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Recursively overlays `updates` onto `base`
fn merge_json(base: &mut serde_json::Value, updates: &serde_json::Value) {
    match (base, updates) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, updates) => *base = updates.clone(),
    }
}

/// Route-level error with an HTTP status
#[derive(Debug)]
pub enum AppError {
    /// 404 with a message
    NotFound(String),
    /// 400 with a message
    BadRequest(String),
    /// 500 wrapping the underlying error
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(e) => {
                tracing::error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
