// HTTP routes: event ingestion and the rollup read API

mod http;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::metrics_repo::MetricsRepo;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) repo: Arc<MetricsRepo>,
}

pub fn app(repo: Arc<MetricsRepo>) -> Router {
    let state = AppState { repo };
    Router::new()
        .route("/", get(|| async { "mcp-metrics: tool-call rollup service" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/events", post(http::append_event_handler)) // POST /api/events
        .route("/api/rollups", get(http::get_rollups_handler)) // GET /api/rollups
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
