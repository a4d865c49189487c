// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::models::LiveSnapshot;
use crate::query::MetricsQuery;
use crate::sampler::Sampler;
use crate::sysinfo_repo::SysinfoRepo;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) live_tx: broadcast::Sender<LiveSnapshot>,
    pub(crate) sampler: Arc<Sampler>,
    pub(crate) sysinfo_repo: Arc<SysinfoRepo>,
    pub(crate) query: Arc<MetricsQuery>,
    pub(crate) ws_live_connections: Arc<AtomicUsize>,
}

pub fn app(
    live_tx: broadcast::Sender<LiveSnapshot>,
    sampler: Arc<Sampler>,
    sysinfo_repo: Arc<SysinfoRepo>,
    query: Arc<MetricsQuery>,
    ws_live_connections: Arc<AtomicUsize>,
) -> Router {
    let state = AppState {
        live_tx,
        sampler,
        sysinfo_repo,
        query,
        ws_live_connections,
    };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/metrics/history", get(http::history_handler)) // GET /api/metrics/history
        .route("/api/metrics/top", get(http::top_handler)) // GET /api/metrics/top
        .route("/api/metrics/live", get(http::live_handler)) // GET /api/metrics/live
        .route("/api/containers/{id}/restart", post(http::restart_handler)) // POST /api/containers/{id}/restart
        .route("/api/containers/{id}/logs", get(http::logs_handler)) // GET /api/containers/{id}/logs
        .route("/ws/live", get(ws::ws_live)) // WS /ws/live
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
