//! HTTP routes.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_pipeline::{UploadBatch, UploadPipeline};

use crate::{WebError, latest_log_file, select_lines};

/// Default request body limit: 100 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Shared state for the web server.
pub struct AppState {
    pub pipeline: Arc<UploadPipeline>,
    /// Directory holding the rolling log files.
    pub log_dir: PathBuf,
}

impl AppState {
    pub fn new(pipeline: Arc<UploadPipeline>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            log_dir: log_dir.into(),
        }
    }
}

/// Create the router.
pub fn create_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/upload", post(upload))
        .route("/api/v1/upload/", post(upload))
        .route("/api/v1/devices/list", get(device_list))
        .route("/api/v1/jobs", get(job_list))
        .route("/api/v1/logs", get(log_lines))
        .route("/api/v1/logs/", get(log_lines))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Success payload for an accepted upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub code: u8,
    pub msg: &'static str,
    pub device_name: String,
    pub timestamp: i64,
    pub files_count: usize,
}

async fn upload(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UploadBatch>, JsonRejection>,
) -> Result<impl IntoResponse, WebError> {
    let Json(batch) = body?;
    let receipt = state.pipeline.accept(batch).await?;

    info!(
        device = %receipt.device_name,
        folder = %receipt.folder,
        files = receipt.files.len(),
        transferred = receipt.immediate.transfer.success,
        scheduled = receipt.scheduled.success,
        "upload accepted"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            code: 1,
            msg: "success",
            device_name: receipt.device_name,
            timestamp: receipt.timestamp,
            files_count: receipt.files.len(),
        }),
    ))
}

async fn device_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let devices = state.pipeline.channel().registry().names();
    Json(json!({
        "code": 1,
        "status": "success",
        "data": { "devices": devices },
    }))
}

#[derive(Debug, Serialize)]
struct JobView {
    id: String,
    name: String,
    fire_at: DateTime<FixedOffset>,
    payload: serde_json::Value,
}

async fn job_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let jobs: Vec<JobView> = state
        .pipeline
        .scheduler()
        .jobs()
        .await
        .into_iter()
        .map(|job| JobView {
            id: job.id,
            name: job.name,
            fire_at: job.fire_at,
            payload: job.payload,
        })
        .collect();

    Json(json!({
        "code": 1,
        "status": "success",
        "data": { "jobs": jobs },
    }))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    level: Option<String>,
}

/// Lines of the current log file, newest first.
async fn log_lines(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<String>>, WebError> {
    let path = latest_log_file(&state.log_dir)
        .await
        .map_err(WebError::LogRead)?
        .ok_or(WebError::LogNotFound)?;
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(WebError::LogRead)?;

    Ok(Json(select_lines(&text, query.level.as_deref())))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub scheduler_running: bool,
    pub pending_jobs: usize,
    pub version: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let scheduler = state.pipeline.scheduler();
    Json(HealthResponse {
        status: "ok",
        scheduler_running: scheduler.is_running(),
        pending_jobs: scheduler.pending_count().await,
        version: env!("CARGO_PKG_VERSION"),
    })
}
