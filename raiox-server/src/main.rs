//! Raiox Server - REST API for X-ray implant identification
//!
//! Endpoints:
//! - POST /webhook - Ingest an image by URL
//! - POST /upload - Ingest an uploaded image
//! - GET /api/v1/implants, /api/v1/implants/{id} - Catalog reads
//! - GET /api/v1/submissions/{client_id}/{submission_id} - Recorded results
//! - GET /health, /ready - Monitoring
//! - GET /docs - Swagger UI

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use raiox_server::{
    create_router_with_config, AppState, BlobStore, Config, EmbeddingService, FetchConfig,
    HttpBlobStore, HttpImageFetcher, IngestStore, MemoryBlobStore, MemoryStore, PostgresStore,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "raiox_server={log_level},raiox_core={log_level},tower_http=info"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = ?e, "Server failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();
    tracing::info!(?config, "Configuration loaded");

    let store: Arc<dyn IngestStore> = match &config.database_url {
        Some(url) => Arc::new(
            PostgresStore::new(
                url,
                config.database_max_connections,
                config.database_min_connections,
            )
            .await
            .context("failed to open database")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
            Arc::new(MemoryStore::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = match &config.spaces {
        Some(spaces) => Arc::new(
            HttpBlobStore::new(spaces.clone(), Duration::from_secs(config.timeout_secs))
                .context("failed to configure blob storage")?,
        ),
        None => {
            tracing::warn!("SPACES_ENDPOINT/SPACES_BUCKET not set, keeping uploads in memory");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let fetcher = HttpImageFetcher::new(FetchConfig {
        timeout: Duration::from_secs(config.fetch_timeout_secs),
        max_retries: config.fetch_max_retries,
        max_bytes: config.max_file_size(),
        ..FetchConfig::default()
    })
    .context("failed to create image fetcher")?;

    let embedder = EmbeddingService::initialize(config.embedder.clone(), config.embed_max_concurrency)
        .context("failed to initialize embedding model")?;

    let state = AppState::new(
        store,
        embedder.clone(),
        blobs,
        Arc::new(fetcher),
        config.result_limit,
        config.max_file_size(),
    );

    let app = create_router_with_config(state, &config);
    let addr = config.socket_addr();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "Raiox server listening");
    tracing::info!("API documentation at http://{}/docs", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    embedder.shutdown();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
