//! Server setup and initialization
//!
//! Wires together all components: SQLite storage, executor registry, status
//! hub, execution engine, and HTTP routes.

use crate::{
    api::{create_run_routes, create_workflow_routes, AppState},
    config::Config,
    runtime::{
        engine::ExecutionEngine, registry::ExecutorRegistry, status::ChannelStatusPublisher,
        step::SqliteStepStore,
    },
    workflow::storage::WorkflowStorage,
};
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Create the main Axum application with all routes
///
/// Opens (or creates) `flowline.db` under the configured data directory; it
/// holds both workflow definitions and step checkpoints.
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)
        .with_context(|| format!("Failed to create data directory {}", config.database.data_dir))?;

    let db_path = Path::new(&config.database.data_dir).join("flowline.db");
    tracing::info!("🗄️ Opening SQLite database: {}", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(SqliteConnectOptions::new().filename(&db_path).create_if_missing(true))
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    tracing::info!("📋 Initializing workflow storage");
    let workflows = WorkflowStorage::new(pool.clone());
    workflows.init_schema().await.context("Failed to create workflow schema")?;

    tracing::info!("💾 Initializing step checkpoint store");
    let steps = SqliteStepStore::new(pool);
    steps.init_schema().await.context("Failed to create step checkpoint schema")?;

    tracing::info!("🧩 Building executor registry");
    let registry = ExecutorRegistry::with_builtins(&config.engine).context("Failed to build executor registry")?;
    tracing::debug!("🧩 Registered node types: {:?}", registry.registered_types());

    let status = Arc::new(ChannelStatusPublisher::new(
        config.engine.status_channel_capacity,
        config.engine.status_retained_runs,
    ));

    tracing::info!("🚀 Initializing execution engine");
    let engine = Arc::new(ExecutionEngine::new(
        Arc::new(workflows.clone()),
        Arc::new(registry),
        Arc::new(steps),
        status.clone(),
        config.engine.retry_policy(),
    ));

    let app_state = AppState {
        engine,
        workflows,
        status,
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_run_routes())
        .with_state(app_state);

    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Start the HTTP server with the given configuration
///
/// Log verbosity follows `RUST_LOG` and defaults to `info`.
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Flowline server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
