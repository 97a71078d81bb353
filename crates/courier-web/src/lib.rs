//! HTTP binding for courier.
//!
//! This crate exposes:
//! - `POST /api/v1/upload`: accept an upload batch
//! - `GET /api/v1/devices/list`: configured logical device names
//! - `GET /api/v1/jobs`: pending deferred jobs
//! - `GET /api/v1/logs`: recent log lines, newest first
//! - `GET /health`: liveness and scheduler state

mod error;
mod logs;
mod routes;

pub use error::WebError;
pub use logs::{LOG_FILE_PREFIX, LOG_FILE_SUFFIX, MAX_LOG_FILES, latest_log_file, select_lines};
pub use routes::{AppState, DEFAULT_MAX_BODY_BYTES, HealthResponse, UploadResponse, create_router};
