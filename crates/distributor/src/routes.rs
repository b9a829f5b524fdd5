use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use distqueue_common::api::distributor::{
    FleetReport, ScalingMetrics, StatsResponse, StatusAck, StatusUpdate, SubmitResponse,
    WorkRequest, WorkResponse,
};
use distqueue_common::types::LogRecord;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::error::ApiError;
use crate::service::Distributor;

/// State shared across axum handlers.
pub struct AppState {
    pub distributor: Distributor,
    pub metrics_handle: PrometheusHandle,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/prometheus_metrics", get(prometheus_metrics_handler))
        .route("/submit", post(submit_handler))
        .route("/get_work", post(get_work_handler))
        .route("/status", post(status_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .route("/reset", post(reset_handler))
        .route("/internal/fleet_report", post(fleet_report_handler))
        .with_state(state)
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "Log Distributor",
        "version": "1.0.0",
        "architecture": "pull-based-work-queue",
    }))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "healthy"})))
}

/// Internal Prometheus exposition, separate from the `/metrics` contract
/// endpoint below which returns the spec's `ScalingMetrics` JSON object.
async fn prometheus_metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Json(record): Json<LogRecord>,
) -> impl IntoResponse {
    let task_id = state.distributor.submit_log(record).await;
    Json(SubmitResponse {
        status: "accepted".to_string(),
        task_id: task_id.to_string(),
    })
}

async fn get_work_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WorkRequest>,
) -> Json<WorkResponse> {
    Json(state.distributor.get_work(&request).await)
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<StatusAck>, ApiError> {
    state
        .distributor
        .update_status(
            &update.task_id,
            &update.analyzer_id,
            update.status,
            update.message.as_deref(),
        )
        .await?;
    Ok(Json(StatusAck::default()))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(state.distributor.get_stats().await)
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<ScalingMetrics> {
    Json(state.distributor.get_metrics().await)
}

async fn reset_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.distributor.reset().await;
    (StatusCode::OK, Json(serde_json::json!({"status": "reset"})))
}

async fn fleet_report_handler(
    State(state): State<Arc<AppState>>,
    Json(report): Json<FleetReport>,
) -> Json<StatusAck> {
    state.distributor.fleet().report(report);
    Json(StatusAck::default())
}
