use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::pool::AnalyzerPool;

pub struct AppState {
    pub pool: Arc<AnalyzerPool>,
    pub metrics_handle: PrometheusHandle,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct StatsResponse {
    analyzer_count: usize,
    total_processed: u64,
    total_failed: u64,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/prometheus_metrics", get(prometheus_metrics))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let pool_stats = state.pool.stats().await;
    Json(StatsResponse {
        analyzer_count: pool_stats.analyzers.len(),
        total_processed: pool_stats.total_processed,
        total_failed: pool_stats.total_failed,
    })
}
