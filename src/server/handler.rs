// Axum request handlers: the HTTP surface over the catalog, fetcher and promoter.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::state::AppState;
use crate::engine::stats::FetchStatsSnapshot;
use crate::error::ReviewError;
use crate::model::{EditableContainer, ItemContent, RemoteListing, ResultContainer};

pub struct ReviewServer {
    port: u16,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReviewServer {
    /// Bind `addr` and serve in the background. Port 0 picks a free port.
    pub async fn start(addr: &str, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = router(state);

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("review server stopped with error: {}", e);
            }
        });
        info!("review server listening on port {}", port);

        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Loopback URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/markdown-files", get(list_markdown_files))
        .route("/json-folders", get(list_json_folders))
        .route("/result-files", get(list_result_files))
        .route("/files/{id}/content", get(file_content))
        .route("/files/{id}/download", get(file_download))
        .route("/save-json", post(save_json))
        .route("/cache/clear", post(clear_cache))
        .route("/health", get(health))
        .route("/reconciliation", get(reconciliation))
        .with_state(state)
}

/// A failed request rendered as `{"error": ...}`.
pub struct ApiError(ReviewError);

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            debug!("rejected request: {}", self.0);
            StatusCode::BAD_REQUEST
        } else {
            error!("request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// GET /markdown-files
async fn list_markdown_files(State(state): State<AppState>) -> ApiResult<Json<Vec<RemoteListing>>> {
    let listing = state.catalog.source_documents().await?;
    Ok(Json(listing.as_ref().clone()))
}

/// GET /json-folders
async fn list_json_folders(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<EditableContainer>>> {
    let containers = state.catalog.editable_containers().await?;
    Ok(Json(containers.as_ref().clone()))
}

/// GET /result-files
async fn list_result_files(State(state): State<AppState>) -> ApiResult<Json<Vec<ResultContainer>>> {
    let results = state.catalog.result_containers().await?;
    Ok(Json(results.as_ref().clone()))
}

/// GET /files/{id}/content: the object decoded as UTF-8 (lossy).
async fn file_content(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let bytes = state.fetcher.fetch(&id).await?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct DownloadParams {
    name: Option<String>,
}

/// GET /files/{id}/download: raw bytes as an attachment.
async fn file_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    let bytes = state.fetcher.fetch(&id).await?;
    let filename = attachment_name(params.name.as_deref().unwrap_or(&id));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Keep a filename safe inside a quoted header parameter.
fn attachment_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c == '"' || c == '\\' || !(c == ' ' || c.is_ascii_graphic()) {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.trim().is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveJsonRequest {
    json_file: Option<JsonFilePayload>,
    folder_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonFilePayload {
    name: Option<String>,
    content: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveJsonResponse {
    message: String,
    file_id: String,
    folder_id: String,
}

/// POST /save-json: promote one file into a results folder.
async fn save_json(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<SaveJsonResponse>> {
    let request: SaveJsonRequest = serde_json::from_slice(&body)
        .map_err(|e| ReviewError::invalid_input(format!("invalid request body: {}", e)))?;
    let file = request
        .json_file
        .ok_or_else(|| ReviewError::invalid_input("jsonFile is required"))?;

    let name = file.name.unwrap_or_default();
    let folder_name = request.folder_name.unwrap_or_default();
    let content = file.content.map(ItemContent::from_value);

    let outcome = state
        .promoter
        .promote_content(&name, content.as_ref(), &folder_name)
        .await?;

    Ok(Json(SaveJsonResponse {
        message: format!("Saved {} to {}", name, folder_name),
        file_id: outcome.file_id,
        folder_id: outcome.container_id,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearCacheRequest {
    key_prefix: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearCacheResponse {
    message: String,
    cleared_prefix: Option<String>,
    removed: usize,
}

/// POST /cache/clear: drop every key with the given prefix, or everything.
async fn clear_cache(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ClearCacheResponse>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ClearCacheRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ReviewError::invalid_input(format!("invalid request body: {}", e)))?
    };

    let prefix = request.key_prefix.filter(|p| !p.is_empty());
    let removed = state
        .cache
        .invalidate(prefix.as_deref().unwrap_or(""))
        .await;
    let message = match &prefix {
        Some(p) => format!("Cleared cache entries with prefix {}", p),
        None => "Cleared entire cache".to_string(),
    };
    info!("{} ({} removed)", message, removed);

    Ok(Json(ClearCacheResponse {
        message,
        cleared_prefix: prefix,
        removed,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    cached_keys: u64,
    cache_ttl_secs: u64,
    max_concurrent_downloads: usize,
    fetches: FetchStatsSnapshot,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cached_keys: state.cache.len().await,
        cache_ttl_secs: state.cache.ttl().as_secs(),
        max_concurrent_downloads: state.fetcher.max_concurrency(),
        fetches: state.fetcher.stats().snapshot(),
    })
}

/// GET /reconciliation: refresh the session and return its view.
async fn reconciliation(State(state): State<AppState>) -> Response {
    Json(state.session.refresh().await).into_response()
}
