mod error;
mod routes_api;

pub use error::ApiError;

use crate::config::Config;
use af_apk::{Decompiler, Recompiler};
use af_pipeline::{
    ApkCatalog, ApkImporter, InMemoryApkStore, InMemoryTaskStore, StorageLayout, TaskDispatcher,
    TaskPipeline,
};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub dispatcher: Arc<TaskDispatcher>,
    pub importer: Arc<ApkImporter>,
    pub catalog: Arc<ApkCatalog>,
    pub config: Arc<Config>,
}

impl AppContext {
    /// Wire the task pipeline, importer and catalog for `config` around the
    /// given tool implementations. Task and package records are kept in
    /// memory.
    pub fn new(
        config: Config,
        recompiler: Arc<dyn Recompiler>,
        decompiler: Arc<dyn Decompiler>,
    ) -> Self {
        let layout = StorageLayout::new(config.storage.data_dir.clone());
        let tasks = Arc::new(InMemoryTaskStore::new());
        let apks = Arc::new(InMemoryApkStore::new());

        let pipeline = TaskPipeline::new(tasks.clone(), layout.clone(), recompiler)
            .with_retention(config.tasks.workspace_retention);
        let dispatcher = TaskDispatcher::new(pipeline, apks.clone(), config.tasks.max_concurrent);

        let importer = ApkImporter::new(
            layout.clone(),
            apks.clone(),
            decompiler,
            config.tasks.max_upload_bytes(),
        );
        let catalog = ApkCatalog::new(layout, apks, tasks);

        Self {
            dispatcher: Arc::new(dispatcher),
            importer: Arc::new(importer),
            catalog: Arc::new(catalog),
            config: Arc::new(config),
        }
    }
}

pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", routes_api::api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Start the HTTP server and run until Ctrl-C or SIGTERM.
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .context("Invalid server address")?;

    ctx.dispatcher
        .layout()
        .ensure_directories()
        .context("Failed to create storage directories")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
