// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router assembly and the listening loop.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use murmur_agent::MemoryOrchestrator;
use murmur_config::model::GatewayConfig;
use murmur_core::MurmurError;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Concurrent requests served before callers queue.
const MAX_CONCURRENT_REQUESTS: usize = 256;

/// State for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Instant,
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<MemoryOrchestrator>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

impl GatewayState {
    pub fn new(orchestrator: Arc<MemoryOrchestrator>, bearer_token: Option<String>) -> Self {
        Self {
            orchestrator,
            auth: AuthConfig { bearer_token },
            health: HealthState {
                start_time: Instant::now(),
                prometheus_render: None,
            },
        }
    }

    /// Serve `render()` output on `/metrics`.
    pub fn with_metrics(mut self, render: Arc<dyn Fn() -> String + Send + Sync>) -> Self {
        self.health.prometheus_render = Some(render);
        self
    }
}

/// Build the full route table.
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/status", get(handlers::get_status))
        .route("/v1/turns", post(handlers::post_turn))
        .route(
            "/v1/sessions/{id}/messages",
            post(handlers::post_session_message),
        )
        .route("/v1/sessions/{id}/close", post(handlers::post_session_close))
        .route("/v1/search", get(handlers::get_search))
        .route(
            "/v1/users/{user}/memories",
            get(handlers::get_memories).post(handlers::post_memory),
        )
        .route("/v1/memories/{id}", delete(handlers::delete_memory))
        .route("/v1/entities/extract", post(handlers::post_extract_entities))
        .route("/v1/users/{user}/entities", get(handlers::get_entities))
        .route(
            "/v1/consolidation/run",
            post(handlers::post_consolidation_run),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `cancel` fires, then finish in-flight requests.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), MurmurError> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MurmurError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| MurmurError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
