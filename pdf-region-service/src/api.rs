//! HTTP API for the region extraction service.
//!
//! - `GET /health` liveness check
//! - `POST /v1/extract` batch extraction (also served at
//!   `/v1/process-document-images`)

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::extraction::BatchOrchestrator;

pub mod extract;
use extract::extract_handler;

/// Request bodies carry only coordinates and ids, but batches can be long.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Application state
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub orchestrator: Arc<BatchOrchestrator>,
    /// One permit per batch allowed to run at once
    pub permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: ServiceConfig, orchestrator: BatchOrchestrator) -> Self {
        let permits = Arc::new(Semaphore::new(config.limits.max_concurrent_requests));
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            permits,
        }
    }
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1_routes = Router::new()
        .route("/extract", post(extract_handler))
        .route("/process-document-images", post(extract_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}
