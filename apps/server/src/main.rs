//! # Barback Server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  React SPA ───► HTTP (3001) /api ───► Routes ───► Store (SQLite)        │
//! │                                          │                              │
//! │                                          ├──► OpenAI (narratives)       │
//! │                                          └──► Stripe Terminal           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use barback_db::{Database, DbConfig};
use barback_server::config::{ServerConfig, StoreKind};
use barback_server::{build_router, AppState};

const DEFAULT_LOG_FILTER: &str = "info,barback_server=debug,barback_db=debug,sqlx=warn,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with_target(true)
        .init();

    info!("Starting Barback server...");

    // Load configuration
    let config = ServerConfig::load().context("loading configuration")?;
    info!(
        addr = %config.bind_address(),
        environment = ?config.environment,
        store = ?config.store,
        llm = config.openai_api_key.is_some(),
        "Configuration loaded"
    );

    let db = open_store(&config).await?;
    info!(store = db.kind(), "Store ready");

    let state = Arc::new(AppState::new(db.clone(), config.clone()).context("building HTTP clients")?);
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;
    info!(addr = %config.bind_address(), "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Opens the configured store, falling back to memory when allowed.
async fn open_store(config: &ServerConfig) -> anyhow::Result<Database> {
    match config.store {
        StoreKind::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            Ok(Database::in_memory())
        }
        StoreKind::Sqlite => match Database::sqlite(DbConfig::new(&config.db_path)).await {
            Ok(db) => Ok(db),
            Err(e) if config.store_fallback => {
                error!(path = %config.db_path.display(), "Could not open SQLite: {}", e);
                warn!("Falling back to the in-memory store; data is lost on restart");
                Ok(Database::in_memory())
            }
            Err(e) => Err(e).with_context(|| format!("opening {}", config.db_path.display())),
        },
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
