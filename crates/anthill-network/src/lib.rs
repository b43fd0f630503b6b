//! HTTP boundary for the log archive.
//!
//! - `POST /api/debug-log` stores a snapshot.
//! - `GET /api/debug-logs` lists identifiers, newest first.
//! - `GET /api/debug-log/{filename}` returns one stored snapshot.

use std::sync::Arc;

use anthill_archive::LogArchive;
use anthill_types::{config::ServerConfig, telemetry::TelemetrySnapshot, AnthillError, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct ApiState {
    archive: LogArchive,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub status: &'static str,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub log_files: Vec<String>,
}

pub fn router(archive: LogArchive) -> Router {
    Router::new()
        .route("/api/debug-log", post(save_debug_log))
        .route("/api/debug-logs", get(list_debug_logs))
        .route("/api/debug-log/:filename", get(get_debug_log))
        .with_state(Arc::new(ApiState { archive }))
}

/// Binds `bind_addr:port` and serves until the task is dropped.
pub async fn serve(config: &ServerConfig, archive: LogArchive) -> Result<()> {
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| AnthillError::Network(format!("failed to bind {addr}: {err}")))?;
    info!("Log archive listening on {}", addr);
    axum::serve(listener, router(archive))
        .await
        .map_err(|err| AnthillError::Network(format!("server error: {err}")))
}

async fn save_debug_log(
    State(state): State<Arc<ApiState>>,
    Json(snapshot): Json<TelemetrySnapshot>,
) -> Response {
    match state.archive.archive(&snapshot).await {
        Ok(filename) => Json(SaveResponse {
            status: "success",
            filename,
        })
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_debug_logs(State(state): State<Arc<ApiState>>) -> Response {
    match state.archive.list().await {
        Ok(log_files) => Json(ListResponse { log_files }).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_debug_log(
    State(state): State<Arc<ApiState>>,
    Path(filename): Path<String>,
) -> Response {
    match state.archive.read(&filename).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: AnthillError) -> Response {
    let (status, message) = match &err {
        AnthillError::InvalidIdentifier(_) => (StatusCode::BAD_REQUEST, "Invalid filename".into()),
        AnthillError::NotFound(_) => (StatusCode::NOT_FOUND, "File not found".into()),
        AnthillError::InvalidSnapshot(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        _ => {
            warn!("Archive request failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    };
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
