//! HTTP surface for expert ingestion, technician search and chat.
//!
//! # Endpoints
//!
//! - `POST /store_log` - Store an expert log (chat transcripts are acknowledged, not stored)
//! - `GET /get_logs/:expert_id?elevator_id=` - List an expert's logs
//! - `GET /knowledge_search?query=&elevator_id=&top_k=` - Semantic search
//! - `POST /chat` - Grounded diagnosis from the completion service
//! - `GET /health` - Readiness and document count

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    application::{
        AddOutcome, ChatReply, ChatRequest, HealthStatusResponse, IngestPayload, LogListResponse,
        SearchRequest, SearchResponse, StoreLogResponse,
    },
    domain::DomainError,
    KnowledgeBase,
};

#[derive(Clone)]
pub struct AppState {
    kb: Arc<KnowledgeBase>,
}

impl AppState {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/store_log", post(store_log))
        .route("/get_logs/:expert_id", get(get_logs))
        .route("/knowledge_search", get(knowledge_search))
        .route("/chat", post(chat))
        .with_state(state)
}

/// Serves `router` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Error envelope; `field` is `message` on the knowledge routes and `error` on `/chat`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    field: &'static str,
    message: String,
}

impl ApiError {
    fn from_domain(err: DomainError, field: &'static str) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            field,
            message: err.to_string(),
        }
    }

    fn knowledge(err: DomainError) -> Self {
        Self::from_domain(err, "message")
    }

    fn chat(err: DomainError) -> Self {
        Self::from_domain(err, "error")
    }

    /// Malformed bodies and query strings are validation failures.
    fn rejected(rejection: impl std::fmt::Display, field: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            field,
            message: DomainError::validation(rejection.to_string()).to_string(),
        }
    }

    fn join(err: tokio::task::JoinError, field: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            field,
            message: format!("worker task failed: {err}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::Map::new();
        body.insert(self.field.to_string(), Value::String(self.message));
        (self.status, Json(Value::Object(body))).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthStatusResponse>, ApiError> {
    let kb = Arc::clone(&state.kb);
    tokio::task::spawn_blocking(move || kb.health())
        .await
        .map_err(|err| ApiError::join(err, "message"))?
        .map(Json)
        .map_err(ApiError::knowledge)
}

async fn store_log(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::rejected(rejection, "message"))?;
    let payload = IngestPayload::classify(payload).map_err(ApiError::knowledge)?;

    let kb = Arc::clone(&state.kb);
    let outcome = tokio::task::spawn_blocking(move || kb.store().add(payload))
        .await
        .map_err(|err| ApiError::join(err, "message"))?
        .map_err(|err| {
            if !err.is_client_error() {
                error!(error = %err, "failed to store log");
            }
            ApiError::knowledge(err)
        })?;

    let response = match outcome {
        AddOutcome::Stored { id } => (
            StatusCode::CREATED,
            Json(StoreLogResponse {
                message: "Log stored successfully".into(),
                id: Some(id),
            }),
        ),
        AddOutcome::Deflected { reason } => (
            StatusCode::OK,
            Json(StoreLogResponse {
                message: format!("AI chat not stored: {reason}"),
                id: None,
            }),
        ),
    };

    Ok(response.into_response())
}

#[derive(Debug, Default, Deserialize)]
struct LogsQuery {
    elevator_id: Option<String>,
}

async fn get_logs(
    State(state): State<AppState>,
    Path(expert_id): Path<String>,
    params: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<LogListResponse>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::rejected(rejection, "message"))?;
    let kb = Arc::clone(&state.kb);
    let logs = tokio::task::spawn_blocking(move || {
        kb.store()
            .get_by_expert(&expert_id, params.elevator_id.as_deref())
    })
    .await
    .map_err(|err| ApiError::join(err, "message"))?
    .map_err(ApiError::knowledge)?;

    Ok(Json(LogListResponse { logs }))
}

async fn knowledge_search(
    State(state): State<AppState>,
    request: Result<Query<SearchRequest>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(request) = request.map_err(|rejection| ApiError::rejected(rejection, "message"))?;
    if request.query.trim().is_empty() {
        return Err(ApiError::knowledge(DomainError::validation(
            "Missing 'query' parameter.",
        )));
    }

    let kb = Arc::clone(&state.kb);
    tokio::task::spawn_blocking(move || kb.retrieval().search(request))
        .await
        .map_err(|err| ApiError::join(err, "message"))?
        .map(Json)
        .map_err(|err| {
            if !err.is_client_error() {
                error!(error = %err, "search failed");
            }
            ApiError::knowledge(err)
        })
}

async fn chat(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(request) = request.map_err(|rejection| ApiError::rejected(rejection, "error"))?;
    if request.messages.is_empty() {
        return Err(ApiError::chat(DomainError::validation(
            "Missing 'messages' in request body.",
        )));
    }

    info!(turns = request.messages.len(), ground = request.ground, "chat request");

    let kb = Arc::clone(&state.kb);
    tokio::task::spawn_blocking(move || kb.converse(request))
        .await
        .map_err(|err| ApiError::join(err, "error"))?
        .map(Json)
        .map_err(ApiError::chat)
}

