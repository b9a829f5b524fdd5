use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LogRecord, TaskStatus};

/// POST /submit response. The request body is a bare `LogRecord`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    pub task_id: String,
}

/// POST /get_work request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkRequest {
    pub analyzer_id: String,
    /// Capacity/concurrency level; advisory, recorded for metrics only.
    pub weight: f64,
    pub current_tasks: u32,
}

/// POST /get_work response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_data: Option<LogRecord>,
    #[serde(default)]
    pub has_work: bool,
    #[serde(default = "default_no_work_message")]
    pub message: String,
}

fn default_no_work_message() -> String {
    "No work available".to_string()
}

/// POST /status request — also serves as a heartbeat when `status` is
/// `in_progress`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: String,
    pub analyzer_id: String,
    pub status: TaskStatus,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST /status response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusAck {
    pub status: String,
}

impl Default for StatusAck {
    fn default() -> Self {
        Self {
            status: "acknowledged".to_string(),
        }
    }
}

/// GET /metrics response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScalingMetrics {
    pub queue_depth: u64,
    pub in_progress_count: u64,
    pub total_analyzers: u32,
    pub active_analyzers: u32,
    pub queue_backpressure: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// GET /stats response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub queue_depth: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_received: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_requeued: u64,
    pub backpressure: f64,
    pub analyzers: AnalyzerCounts,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyzerCounts {
    pub total: u32,
    pub active: u32,
}

/// POST /internal/fleet_report request — Supervisor → Distributor push
/// registering the live size of the Analyzer fleet it manages. Not part of
/// the Emitter/Analyzer-facing contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FleetReport {
    pub total_analyzers: u32,
    pub active_analyzers: u32,
}
