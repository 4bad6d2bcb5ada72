//! identikitd: face identification backend and same-origin proxy.
//!
//! Backend routes (`/get-image`, `/search`, `/add-person`, ...) run the
//! recognition pipeline against the SQLite gallery. Proxy routes under
//! `/api/` normalize JSON or multipart uploads and forward them to a
//! backend, by default this same process.

pub mod config;
pub mod engine;
pub mod error;
pub mod routes;
pub mod store;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::engine::FaceEmbedder;
use crate::store::PersonStore;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub embedder: Arc<dyn FaceEmbedder>,
    pub store: PersonStore,
    /// Client used by the proxy routes.
    pub http: reqwest::Client,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, embedder: Arc<dyn FaceEmbedder>, store: PersonStore) -> Self {
        Self {
            config: Arc::new(config),
            embedder,
            store,
            http: reqwest::Client::new(),
            startup_time: Utc::now(),
        }
    }
}

/// Build the full router: backend routes, proxy routes, tracing, CORS.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .merge(routes::backend_routes())
        .merge(routes::proxy_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
