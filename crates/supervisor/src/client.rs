use std::time::Duration;

use distqueue_common::api::distributor::{FleetReport, ScalingMetrics, StatusUpdate, WorkRequest, WorkResponse};
use distqueue_common::types::TaskStatus;

/// Thin HTTP client for talking to the Distributor. Every call here
/// swallows transient network errors and logs them rather than
/// propagating — per the failure semantics in the supervisor/worker
/// contract, a dropped request just becomes a server-side timeout that the
/// Distributor's own monitor recovers from.
pub struct DistributorClient {
    http: reqwest::Client,
    base_url: String,
}

impl DistributorClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn pull_work(
        &self,
        analyzer_id: &str,
        weight: f64,
        current_tasks: u32,
    ) -> Option<WorkResponse> {
        let request = WorkRequest {
            analyzer_id: analyzer_id.to_string(),
            weight,
            current_tasks,
        };

        match self
            .http
            .post(format!("{}/get_work", self.base_url))
            .json(&request)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response.json().await.ok(),
            Ok(response) => {
                tracing::warn!(status = %response.status(), "failed to get work");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "error requesting work");
                None
            }
        }
    }

    pub async fn send_status(
        &self,
        task_id: &str,
        analyzer_id: &str,
        status: TaskStatus,
        message: Option<&str>,
    ) {
        let update = StatusUpdate {
            task_id: task_id.to_string(),
            analyzer_id: analyzer_id.to_string(),
            status,
            timestamp: chrono::Utc::now(),
            message: message.map(str::to_string),
        };

        match self
            .http
            .post(format!("{}/status", self.base_url))
            .json(&update)
            .send()
            .await
        {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    task_id,
                    status = %response.status(),
                    "failed to send status"
                );
            }
            Err(e) => {
                tracing::error!(task_id, error = %e, "error sending status");
            }
            Ok(_) => {}
        }
    }

    /// Best-effort queue depth query, used by the autoscale loop. Returns 0
    /// on any failure, matching the source's "never let a metrics hiccup
    /// stall scaling decisions" behavior.
    pub async fn queue_depth(&self) -> u64 {
        self.get_metrics().await.map(|m| m.queue_depth).unwrap_or(0)
    }

    pub async fn get_metrics(&self) -> Option<ScalingMetrics> {
        match self.http.get(format!("{}/metrics", self.base_url)).send().await {
            Ok(response) if response.status().is_success() => response.json().await.ok(),
            Ok(response) => {
                tracing::debug!(status = %response.status(), "failed to get metrics");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to get metrics");
                None
            }
        }
    }

    /// Register/refresh this supervisor's fleet counts with the Distributor.
    pub async fn report_fleet(&self, report: FleetReport) {
        if let Err(e) = self
            .http
            .post(format!("{}/internal/fleet_report", self.base_url))
            .json(&report)
            .send()
            .await
        {
            tracing::debug!(error = %e, "failed to push fleet report");
        }
    }
}
