use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use identikitd::config::Config;
use identikitd::engine::{self, ProbeSettings};
use identikitd::store::PersonStore;
use identikitd::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "identikitd starting");

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind,
        model_dir = %config.model_dir.display(),
        db = %config.db_path.display(),
        backend = %config.backend_url,
        threshold = config.similarity_threshold,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(
        &config.scrfd_model_path(),
        &config.arcface_model_path(),
        ProbeSettings { size: config.probe_size, tone: config.tone },
        config.engine_queue,
    )
    .context("failed to start recognition engine")?;

    let store = PersonStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open gallery {}", config.db_path.display()))?;
    tracing::info!(persons = store.count().await?, "gallery opened");

    let bind = config.bind;
    let app = build_router(AppState::new(config, Arc::new(engine), store));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %bind, "identikitd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("identikitd shutting down");
        })
        .await?;

    Ok(())
}
