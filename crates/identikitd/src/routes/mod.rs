//! HTTP routes.

pub mod backend;
pub mod health;
pub mod proxy;

use axum::Router;

use crate::AppState;

/// Recognition backend routes.
pub fn backend_routes() -> Router<AppState> {
    Router::new()
        .merge(health::health_routes())
        .merge(backend::recognition_routes())
}

/// Same-origin proxy routes under `/api/`.
pub fn proxy_routes() -> Router<AppState> {
    proxy::routes()
}
