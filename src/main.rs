//! Coloring Book Server
//!
//! Generates coloring book PDFs from processed images, stored in
//! S3-compatible object storage.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coloring_book_server::config::{Config, StorageProvider};
use coloring_book_server::routes;
use coloring_book_server::state::AppState;
use coloring_book_server::storage::{MemoryStore, ObjectStore, S3Client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coloring_book_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Coloring Book Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("S3 provider: {:?}", config.storage.provider);
    tracing::info!("S3 bucket: {}", config.storage.bucket);

    let store: Arc<dyn ObjectStore> = match config.storage.provider {
        StorageProvider::Memory => {
            tracing::warn!("Using in-memory storage; finished books are lost on restart");
            Arc::new(MemoryStore::new())
        }
        _ => {
            tracing::info!("S3 endpoint: {}", config.storage.endpoint);
            Arc::new(
                S3Client::new(&config.storage)
                    .await
                    .context("Failed to initialize S3 client")?,
            )
        }
    };

    let state = AppState::with_http_fetcher(config, store)
        .context("Failed to initialize image fetcher")?;
    let app = routes::app(state.clone());

    // Start server with graceful shutdown
    let addr = state.config().bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Coloring Book Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
