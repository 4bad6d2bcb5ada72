//! Liveness endpoints.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the engine or gallery is unavailable
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub models_loaded: bool,
    /// Enrolled persons, absent if the gallery could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gallery_size: Option<usize>,
    pub similarity_threshold: f32,
}

/// GET /hello
async fn hello() -> Json<Value> {
    Json(json!({ "message": "hello" }))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let models_loaded = state.embedder.models_loaded();

    let gallery_size = match state.store.count().await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(error = %e, "health: gallery count failed");
            None
        }
    };

    let status = if models_loaded && gallery_size.is_some() { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        models_loaded,
        gallery_size,
        similarity_threshold: state.config.similarity_threshold,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/hello", get(hello))
        .route("/health", get(health))
}
