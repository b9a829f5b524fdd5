use distqueue_common::api::distributor::{
    AnalyzerCounts, ScalingMetrics, StatsResponse, WorkRequest, WorkResponse,
};
use distqueue_common::config::DistributorConfig;
use distqueue_common::types::{LogRecord, TaskStatus};
use distqueue_common::{DistQueueError, Result, TaskId};
use tokio::sync::watch;

use crate::fleet::FleetRegistry;
use crate::store::{RequeueOutcome, TaskStore};

/// The Distributor: owns the task store and dispatch queue, serves the
/// Emitter/Analyzer-facing API, and drives the background timeout/backpressure
/// monitor. One instance per process, shared behind an `Arc` with axum state.
pub struct Distributor {
    store: TaskStore,
    fleet: FleetRegistry,
    config: DistributorConfig,
}

impl Distributor {
    pub fn new(config: DistributorConfig) -> Self {
        Self {
            store: TaskStore::new(config.max_retries),
            fleet: FleetRegistry::new(),
            config,
        }
    }

    pub fn fleet(&self) -> &FleetRegistry {
        &self.fleet
    }

    /// Submit a log record for processing. Always succeeds.
    pub async fn submit_log(&self, record: LogRecord) -> TaskId {
        let source = record.source.clone();
        let level = record.level;
        let task_id = self.store.submit(record).await;
        let queue_depth = self.store.queue_depth().await;

        tracing::info!(
            task_id = %task_id,
            %source,
            %level,
            queue_depth,
            "received log"
        );
        metrics::counter!("distributor.submit.total").increment(1);
        metrics::gauge!("distributor.queue_depth").set(queue_depth as f64);

        task_id
    }

    /// Pull the next queued task, if any, for `request.analyzer_id`.
    pub async fn get_work(&self, request: &WorkRequest) -> WorkResponse {
        match self.store.pull(&request.analyzer_id).await {
            Some((task_id, log_data)) => {
                let queue_depth = self.store.queue_depth().await;
                tracing::info!(
                    task_id = %task_id,
                    analyzer_id = %request.analyzer_id,
                    level = %log_data.level,
                    queue_depth,
                    "assigned work"
                );
                metrics::counter!("distributor.dispatch.total").increment(1);

                WorkResponse {
                    task_id: Some(task_id.to_string()),
                    log_data: Some(log_data),
                    has_work: true,
                    message: "Work assigned".to_string(),
                }
            }
            None => WorkResponse {
                task_id: None,
                log_data: None,
                has_work: false,
                message: "Queue is empty".to_string(),
            },
        }
    }

    /// Apply a status update from a worker. Unknown-but-well-formed task ids
    /// are logged and silently ignored — a deliberate idempotence choice
    /// (see design notes), since the monitor may have already requeued the
    /// task out from under a slow worker. A malformed task id, by contrast,
    /// is a client error and is surfaced rather than swallowed.
    pub async fn update_status(
        &self,
        task_id_raw: &str,
        analyzer_id: &str,
        status: TaskStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let uuid = task_id_raw.parse::<uuid::Uuid>().map_err(|_| {
            DistQueueError::Validation(format!("malformed task id: {task_id_raw}"))
        })?;
        let task_id = TaskId::from_uuid(uuid);

        match status {
            TaskStatus::InProgress => {
                if self.store.heartbeat(task_id).await {
                    tracing::debug!(task_id = %task_id, analyzer_id, "heartbeat");
                } else {
                    tracing::warn!(task_id = %task_id, analyzer_id, "received update for unknown task");
                }
            }
            TaskStatus::Completed => {
                if self.store.complete(task_id).await {
                    tracing::info!(task_id = %task_id, analyzer_id, "task completed");
                    metrics::counter!("distributor.completed.total").increment(1);
                } else {
                    tracing::warn!(task_id = %task_id, analyzer_id, "received update for unknown task");
                }
            }
            TaskStatus::Failed | TaskStatus::Timeout => {
                if self.store.fail(task_id).await {
                    tracing::warn!(
                        task_id = %task_id,
                        analyzer_id,
                        reason = message.unwrap_or("N/A"),
                        "task failed"
                    );
                    metrics::counter!("distributor.failed.total").increment(1);
                } else {
                    tracing::warn!(task_id = %task_id, analyzer_id, "received update for unknown task");
                }
            }
            TaskStatus::Queued => {
                tracing::warn!(task_id = %task_id, analyzer_id, "ignoring unexpected 'queued' status update");
            }
        }

        Ok(())
    }

    pub async fn get_metrics(&self) -> ScalingMetrics {
        let queue_depth = self.store.queue_depth().await;
        let in_progress_count = self.store.in_progress_count().await;
        let (total_analyzers, active_analyzers) = self.fleet.snapshot();

        let queue_backpressure = if active_analyzers > 0 {
            queue_depth as f64 / active_analyzers as f64
        } else {
            queue_depth as f64
        };

        ScalingMetrics {
            queue_depth,
            in_progress_count,
            total_analyzers,
            active_analyzers,
            queue_backpressure,
            timestamp: chrono::Utc::now(),
        }
    }

    pub async fn get_stats(&self) -> StatsResponse {
        let metrics = self.get_metrics().await;
        StatsResponse {
            queue_depth: metrics.queue_depth,
            in_progress: metrics.in_progress_count,
            completed: self.store.completed_count().await,
            failed: self.store.failed_count().await,
            total_received: self.store.total_received(),
            total_completed: self.store.total_completed(),
            total_failed: self.store.total_failed(),
            total_requeued: self.store.total_requeued(),
            backpressure: metrics.queue_backpressure,
            analyzers: AnalyzerCounts {
                total: metrics.total_analyzers,
                active: metrics.active_analyzers,
            },
        }
    }

    pub async fn reset(&self) {
        self.store.reset().await;
        tracing::info!("distributor state reset");
    }

    /// Run the background monitor until `shutdown` fires. Checks timeouts
    /// then backpressure every `monitor_interval_seconds`.
    pub async fn run_monitor(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = std::time::Duration::from_secs(self.config.monitor_interval_seconds);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.check_timeouts().await;
                    self.check_backpressure().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("monitor loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn check_timeouts(&self) {
        let timeout = chrono::Duration::seconds(self.config.task_timeout_seconds as i64);
        let outcomes = self.store.requeue_timed_out(timeout).await;
        for (task_id, outcome) in outcomes {
            match outcome {
                RequeueOutcome::Requeued { retry_count } => {
                    tracing::warn!(
                        task_id = %task_id,
                        retry_count,
                        max_retries = self.config.max_retries,
                        "task timed out, requeued"
                    );
                    metrics::counter!("distributor.requeued.total").increment(1);
                }
                RequeueOutcome::RetriesExhausted => {
                    tracing::error!(task_id = %task_id, "task exceeded max retries, marked failed");
                    metrics::counter!("distributor.failed.total").increment(1);
                }
            }
        }
    }

    async fn check_backpressure(&self) {
        let metrics = self.get_metrics().await;
        if metrics.queue_depth > self.config.backpressure_threshold {
            tracing::info!(
                queue_depth = metrics.queue_depth,
                threshold = self.config.backpressure_threshold,
                "high backpressure detected"
            );
            metrics::gauge!("distributor.backpressure").set(metrics.queue_backpressure);
        }
    }
}
