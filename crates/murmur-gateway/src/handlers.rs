// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request handlers for the gateway REST API.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use murmur_agent::{NewMemory, StatusReport, TurnContext};
use murmur_core::types::{
    ConsolidationRun, Entity, EntityType, ExtractedEntity, MemorySnippet, Message, MessageRole,
    PersistentMemory,
};

use crate::error::ApiError;
use crate::server::GatewayState;

const DEFAULT_MEMORY_LIMIT: usize = 50;
const DEFAULT_IMPORTANCE: i64 = 5;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordRequest {
    pub role: MessageRole,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub session_id: String,
    /// False when the session was already closed.
    pub closed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub user_id: String,
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub snippets: Vec<MemorySnippet>,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MemoryRequest {
    #[serde(default)]
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub importance: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub user_id: String,
    #[serde(default)]
    pub user_text: String,
    #[serde(default)]
    pub assistant_text: String,
    /// Also resolve each mention to a canonical entity.
    #[serde(default)]
    pub resolve: bool,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub entities: Vec<ExtractedEntity>,
    /// Canonical ids, parallel to `entities`, when resolution was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct EntityQuery {
    #[serde(default, rename = "type")]
    pub entity_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsolidationRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub cutoff_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConsolidationResponse {
    pub runs: Vec<ConsolidationRun>,
}

/// GET /health
///
/// 200 while the store answers, 503 otherwise.
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    let report = state.orchestrator.status().await;
    let (code, status) = if report.healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    };
    (code, Json(body)).into_response()
}

/// GET /metrics
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /v1/status
pub async fn get_status(State(state): State<GatewayState>) -> Json<StatusReport> {
    Json(state.orchestrator.status().await)
}

/// POST /v1/turns
pub async fn post_turn(
    State(state): State<GatewayState>,
    Json(body): Json<TurnRequest>,
) -> Result<Json<TurnContext>, ApiError> {
    let context = state
        .orchestrator
        .handle_turn(&body.user_id, body.session_id.as_deref(), &body.text)
        .await?;
    Ok(Json(context))
}

/// POST /v1/sessions/{id}/messages
pub async fn post_session_message(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    Json(body): Json<RecordRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .orchestrator
        .record_turn(&session_id, body.role, &body.text)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /v1/sessions/{id}/close
pub async fn post_session_close(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Result<Json<CloseResponse>, ApiError> {
    let closed = state.orchestrator.close_session(&session_id).await?;
    Ok(Json(CloseResponse { session_id, closed }))
}

/// GET /v1/search?user_id=..&q=..
pub async fn get_search(
    State(state): State<GatewayState>,
    Query(query): Query<SearchQuery>,
) -> Json<SearchResponse> {
    let limit = query
        .limit
        .unwrap_or(state.orchestrator.config().retrieval.limit);
    let retrieval = state
        .orchestrator
        .search(&query.user_id, &query.q, limit)
        .await;
    Json(SearchResponse {
        snippets: retrieval.snippets,
        degraded: retrieval.degraded,
    })
}

/// GET /v1/users/{user}/memories
pub async fn get_memories(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<PersistentMemory>>, ApiError> {
    let memories = state
        .orchestrator
        .get_persistent_memories(&user_id, query.limit.unwrap_or(DEFAULT_MEMORY_LIMIT))
        .await?;
    Ok(Json(memories))
}

/// POST /v1/users/{user}/memories
pub async fn post_memory(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
    Json(body): Json<MemoryRequest>,
) -> Result<(StatusCode, Json<PersistentMemory>), ApiError> {
    let memory = state
        .orchestrator
        .add_memory(NewMemory {
            user_id,
            category: body.category,
            content: body.content,
            importance: body.importance.unwrap_or(DEFAULT_IMPORTANCE),
            tags: body.tags,
            session_id: body.session_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(memory)))
}

/// DELETE /v1/memories/{id}
pub async fn delete_memory(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.forget_memory(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/entities/extract
pub async fn post_extract_entities(
    State(state): State<GatewayState>,
    Json(body): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let entities = state
        .orchestrator
        .extract_entities(&body.user_id, &body.user_text, &body.assistant_text)
        .await;
    let entity_ids = if body.resolve {
        let mut ids = Vec::with_capacity(entities.len());
        for entity in &entities {
            ids.push(
                state
                    .orchestrator
                    .resolve_entity(&body.user_id, &entity.text, entity.entity_type)
                    .await?,
            );
        }
        Some(ids)
    } else {
        None
    };
    Ok(Json(ExtractResponse {
        entities,
        entity_ids,
    }))
}

/// GET /v1/users/{user}/entities?type=PERSON
pub async fn get_entities(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
    Query(query): Query<EntityQuery>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let entity_type = query.entity_type.as_deref().map(EntityType::parse_lenient);
    let entities = state
        .orchestrator
        .list_entities(&user_id, entity_type)
        .await?;
    Ok(Json(entities))
}

/// POST /v1/consolidation/run
pub async fn post_consolidation_run(
    State(state): State<GatewayState>,
    body: Option<Json<ConsolidationRequest>>,
) -> Result<Json<ConsolidationResponse>, ApiError> {
    let Json(body) = body.unwrap_or_default();
    let runs = state
        .orchestrator
        .run_consolidation(body.user_id.as_deref(), body.cutoff_days)
        .await?;
    Ok(Json(ConsolidationResponse { runs }))
}
