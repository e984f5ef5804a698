/// HTTP API for the browsing UI
///
/// This module handles:
/// - Routing and shared state (this file)
/// - Request handlers and the JSON error type (handlers.rs)
///
/// Manifest builds block on a directory walk and a subprocess, so handlers
/// push them onto tokio's blocking pool.
pub mod handlers;

use std::fs;
use std::io;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::manifest::ManifestBuilder;
use crate::state::DecisionsStore;

pub use handlers::ApiError;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub builder: Arc<ManifestBuilder>,
    pub decisions: Arc<DecisionsStore>,
}

impl AppState {
    pub fn new(config: Config, builder: ManifestBuilder) -> Self {
        let decisions = DecisionsStore::new(config.decisions_path.clone());
        Self {
            config: Arc::new(config),
            builder: Arc::new(builder),
            decisions: Arc::new(decisions),
        }
    }

    /// State backed by the real exiftool binary.
    pub fn from_config(config: Config) -> Self {
        let builder = ManifestBuilder::from_config(&config);
        Self::new(config, builder)
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/api/status", get(handlers::status))
        .route("/api/images", get(handlers::images))
        .route("/api/rebuild-manifest", post(handlers::rebuild_manifest))
        .route("/api/rebuild_manifest", post(handlers::rebuild_manifest))
        .route("/save-decisions", post(handlers::save_decisions))
        .route("/api/client-log", post(handlers::client_log))
        .route("/images/*path", get(handlers::image_file))
        .route("/favicon.ico", get(handlers::favicon))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the folders the server writes into.
pub fn prepare_dirs(config: &Config) -> io::Result<()> {
    fs::create_dir_all(&config.images_dir)?;
    if let Some(parent) = config.manifest_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(&config.log_dir)
}

/// Bind, warm the manifest and serve until SIGINT or SIGTERM.
pub async fn serve(state: AppState) -> io::Result<()> {
    prepare_dirs(&state.config)?;

    let builder = state.builder.clone();
    let warmup = tokio::task::spawn_blocking(move || builder.build(false))
        .await
        .map_err(io::Error::other)?;
    if let Some(advisory) = &warmup.advisory {
        warn!("{}", advisory);
    }
    info!("manifest ready: {} images", warmup.images.len());

    let listener = TcpListener::bind(state.config.bind.as_str()).await?;
    let addr = listener.local_addr()?;
    info!("serving {} at http://{}", state.config.root.display(), addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
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
    info!("shutting down");
}
