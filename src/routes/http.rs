// GET/POST handlers: version, metrics history/top/live, container restart and logs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::error::MetricsError;
use crate::models::Metric;
use crate::query::{parse_containers, parse_limit};
use crate::worker::live_snapshot;

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

const DEFAULT_LOG_TAIL: u32 = 100;

/// `{error, details}` with a status derived from the error kind.
pub(super) struct ApiError {
    context: &'static str,
    err: MetricsError,
}

impl ApiError {
    fn new(context: &'static str) -> impl FnOnce(MetricsError) -> Self {
        move |err| Self { context, err }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.err {
            MetricsError::SourceUnavailable(_) | MetricsError::StoreUninitialized => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            MetricsError::NotFound(_) => StatusCode::NOT_FOUND,
            MetricsError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MetricsError::PartialSample { .. }
            | MetricsError::Aggregation { .. }
            | MetricsError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(error = %self.err, status = status.as_u16(), "{}", self.context);
        (
            status,
            Json(serde_json::json!({
                "error": self.context,
                "details": self.err.to_string(),
            })),
        )
            .into_response()
    }
}

/// GET /version: service name and version from Cargo.toml.
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryParams {
    range: Option<String>,
    containers: Option<String>,
}

/// GET /api/metrics/history?range=24h&containers=a,b
pub(super) async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let containers = parse_containers(params.containers.as_deref());
    let response = state
        .query
        .history(params.range.as_deref(), containers.as_deref())
        .await
        .map_err(ApiError::new("Failed to get historical metrics"))?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub(super) struct TopParams {
    range: Option<String>,
    metric: Option<String>,
    limit: Option<String>,
}

/// GET /api/metrics/top?range=24h&metric=memory&limit=5
pub(super) async fn top_handler(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> Result<impl IntoResponse, ApiError> {
    let metric = Metric::parse(params.metric.as_deref().unwrap_or("memory"));
    let limit = parse_limit(params.limit.as_deref());
    let response = state
        .query
        .top(params.range.as_deref(), metric, limit)
        .await
        .map_err(ApiError::new("Failed to get top consumers"))?;
    Ok(Json(response))
}

/// GET /api/metrics/live samples the fleet and host now.
pub(super) async fn live_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let (snapshot, _) = live_snapshot(&state.sampler, &state.sysinfo_repo)
        .await
        .map_err(ApiError::new("Failed to get live metrics"))?;
    Ok(Json(snapshot))
}

/// POST /api/containers/{id}/restart
pub(super) async fn restart_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .sampler
        .runtime()
        .restart(&id)
        .await
        .map_err(ApiError::new("Failed to restart container"))?;
    tracing::info!(container = %id, "container restarted");
    Ok(Json(serde_json::json!({ "restarted": id })))
}

#[derive(Debug, Deserialize)]
pub(super) struct LogsParams {
    tail: Option<String>,
}

/// GET /api/containers/{id}/logs?tail=100 as plain text.
pub(super) async fn logs_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LogsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let tail = params
        .tail
        .as_deref()
        .and_then(|t| t.trim().parse::<u32>().ok())
        .filter(|t| *t > 0)
        .unwrap_or(DEFAULT_LOG_TAIL);
    let logs = state
        .sampler
        .runtime()
        .logs(&id, tail)
        .await
        .map_err(ApiError::new("Failed to get container logs"))?;
    Ok(logs)
}
