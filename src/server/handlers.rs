use std::io;
use std::path::{Component, Path as FsPath, PathBuf};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, trace, warn};

use super::AppState;
use crate::manifest::BuildOutcome;
use crate::state::DecisionsError;

/// Errors a handler can answer with; rendered as `{ok: false, error}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decisions(#[from] DecisionsError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Io(_) | ApiError::Decisions(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }

        let body = Json(json!({
            "ok": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

async fn run_build(state: &AppState, force: bool) -> Result<BuildOutcome, ApiError> {
    let builder = state.builder.clone();
    let outcome = tokio::task::spawn_blocking(move || builder.build(force))
        .await
        .map_err(io::Error::other)?;
    Ok(outcome)
}

/// 200 with the manifest, or 500 with the advisory and the degraded data.
fn manifest_response(outcome: BuildOutcome) -> Response {
    match outcome.advisory {
        Some(advisory) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "ok": false,
                "error": advisory.to_string(),
                "images": outcome.images,
            })),
        )
            .into_response(),
        None => Json(json!({
            "ok": true,
            "count": outcome.images.len(),
            "images": outcome.images,
        }))
        .into_response(),
    }
}

pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let outcome = run_build(&state, false).await?;
    let tool_error = outcome.advisory_message();

    Ok(Json(json!({
        "ok": tool_error.is_none(),
        "toolError": tool_error,
        // older UI builds read this key
        "exiftoolError": tool_error,
        "manifestExists": state.builder.store().exists(),
    })))
}

pub async fn images(State(state): State<AppState>) -> Result<Response, ApiError> {
    let outcome = run_build(&state, false).await?;
    Ok(manifest_response(outcome))
}

pub async fn rebuild_manifest(State(state): State<AppState>) -> Result<Response, ApiError> {
    info!("manifest rebuild requested");
    let outcome = run_build(&state, true).await?;
    Ok(manifest_response(outcome))
}

pub async fn save_decisions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid JSON: {e}")))?;

    let decisions = match payload.get("decisions") {
        Some(Value::Array(items)) => Value::Array(items.clone()),
        _ => {
            return Err(ApiError::InvalidRequest(
                "invalid JSON: decisions must be an array".to_string(),
            ))
        }
    };
    let count = decisions.as_array().map_or(0, Vec::len);

    let store = state.decisions.clone();
    tokio::task::spawn_blocking(move || store.save_raw(&decisions))
        .await
        .map_err(io::Error::other)??;

    let path = state.config.display_path(state.decisions.path());
    info!("saved {} decisions to {}", count, path);

    Ok(Json(json!({
        "status": "ok",
        "path": path,
        "count": count,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ClientLogEntry {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

impl ClientLogEntry {
    pub fn line(&self) -> String {
        let context = self
            .context
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        format!("[CLIENT] {} | ctx={}", self.message, context)
    }
}

pub async fn client_log(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let entry: ClientLogEntry = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid client log entry: {e}")))?;
    let line = entry.line();

    let log_path = state.config.client_log_path();
    if let Some(parent) = log_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .await?;
    file.write_all(format!("{line}\n").as_bytes()).await?;

    match entry
        .level
        .as_deref()
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("error") | Some("critical") => error!("{}", line),
        Some("warn") | Some("warning") => warn!("{}", line),
        Some("debug") => debug!("{}", line),
        Some("trace") => trace!("{}", line),
        _ => info!("{}", line),
    }

    Ok(Json(json!({ "ok": true })))
}

pub async fn image_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let full = safe_join(&state.config.images_dir, &path)
        .ok_or_else(|| ApiError::InvalidRequest(format!("invalid image path: {path}")))?;

    // Symlinks inside the root may point anywhere; resolve before serving.
    let (Ok(resolved), Ok(root)) = (
        tokio::fs::canonicalize(&full).await,
        tokio::fs::canonicalize(&state.config.images_dir).await,
    ) else {
        return Err(ApiError::NotFound(path));
    };
    if !resolved.starts_with(&root) {
        return Err(ApiError::InvalidRequest(format!("invalid image path: {path}")));
    }

    let is_file = tokio::fs::metadata(&resolved)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(ApiError::NotFound(path));
    }

    let bytes = tokio::fs::read(&resolved).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&full))], bytes).into_response())
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Join a URL path onto `root`, refusing anything that could leave it.
pub fn safe_join(root: &FsPath, relative: &str) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    let mut depth = 0;
    for component in FsPath::new(relative).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (depth > 0).then_some(joined)
}

pub fn content_type(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "application/octet-stream",
    }
}
