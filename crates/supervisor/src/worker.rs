use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use distqueue_common::types::{LogRecord, TaskStatus};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::client::DistributorClient;

/// Pluggable work performed on each pulled `LogRecord`. Swappable so the
/// worker loop itself stays agnostic to what "analysis" means; the default
/// implementation below stands in for whatever real inspection a deployment
/// wires in.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, record: &LogRecord) -> Result<(), String>;
}

/// Simulated analyzer: sleeps for a configured delay and always succeeds.
/// In a real analyzer this would run log parsing, threat scoring, whatever
/// the deployment needs — this crate only needs to model the timing and
/// failure shape of that work.
pub struct SimulatedProcessor {
    delay: Duration,
}

impl SimulatedProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Processor for SimulatedProcessor {
    async fn process(&self, _record: &LogRecord) -> Result<(), String> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[derive(Default)]
pub struct WorkerStats {
    pub total_processed: AtomicU64,
    pub total_failed: AtomicU64,
    pub active_tasks: AtomicU64,
}

#[derive(Clone, Debug)]
pub struct WorkerStatsSnapshot {
    pub analyzer_id: String,
    pub weight: f64,
    pub max_concurrent_tasks: usize,
    pub active_tasks: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub uptime_seconds: f64,
    pub tasks_per_second: f64,
}

/// `max_concurrent = max(1, floor(weight * 10))`.
pub fn max_concurrent_for_weight(weight: f64) -> usize {
    ((weight * 10.0).floor() as i64).max(1) as usize
}

/// A running Analyzer worker: owns its poll loop task and can be stopped
/// (gracefully, draining in-flight work) independently of the rest of the
/// pool.
pub struct AnalyzerHandle {
    pub id: String,
    pub weight: f64,
    pub max_concurrent_tasks: usize,
    stats: Arc<WorkerStats>,
    shutdown_tx: watch::Sender<bool>,
    join_handle: Option<tokio::task::JoinHandle<()>>,
    started_at: Instant,
}

impl AnalyzerHandle {
    pub fn spawn(
        id: String,
        client: Arc<DistributorClient>,
        weight: f64,
        poll_interval: Duration,
        heartbeat_interval: Duration,
        processor: Arc<dyn Processor>,
    ) -> Self {
        let max_concurrent_tasks = max_concurrent_for_weight(weight);
        let stats = Arc::new(WorkerStats::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let join_handle = tokio::spawn(worker_loop(
            id.clone(),
            client,
            weight,
            max_concurrent_tasks,
            poll_interval,
            heartbeat_interval,
            processor,
            Arc::clone(&stats),
            shutdown_rx,
        ));

        Self {
            id,
            weight,
            max_concurrent_tasks,
            stats,
            shutdown_tx,
            join_handle: Some(join_handle),
            started_at: Instant::now(),
        }
    }

    /// Signal the worker to stop pulling new work and wait for in-flight
    /// tasks to drain before returning.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        let uptime = self.started_at.elapsed().as_secs_f64();
        let total_processed = self.stats.total_processed.load(Ordering::Relaxed);
        WorkerStatsSnapshot {
            analyzer_id: self.id.clone(),
            weight: self.weight,
            max_concurrent_tasks: self.max_concurrent_tasks,
            active_tasks: self.stats.active_tasks.load(Ordering::Relaxed),
            total_processed,
            total_failed: self.stats.total_failed.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            tasks_per_second: if uptime > 0.0 {
                total_processed as f64 / uptime
            } else {
                0.0
            },
        }
    }
}

async fn worker_loop(
    id: String,
    client: Arc<DistributorClient>,
    weight: f64,
    max_concurrent: usize,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    processor: Arc<dyn Processor>,
    stats: Arc<WorkerStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut in_flight: JoinSet<()> = JoinSet::new();
    let backoff = poll_interval * 10;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        while in_flight.try_join_next().is_some() {}

        if in_flight.len() >= max_concurrent {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown_rx.changed() => {}
            }
            continue;
        }

        match client.pull_work(&id, weight, in_flight.len() as u32).await {
            Some(work) if work.has_work => {
                let Some(task_id) = work.task_id else { continue };
                let Some(log_data) = work.log_data else { continue };
                let client = Arc::clone(&client);
                let processor = Arc::clone(&processor);
                let stats = Arc::clone(&stats);
                let worker_id = id.clone();
                in_flight.spawn(async move {
                    process_task(worker_id, client, processor, task_id, log_data, heartbeat_interval, stats)
                        .await;
                });
            }
            Some(_) => {
                // Empty queue: back off the full 10x interval, matching the
                // source's `_worker_loop` (no distinction from a request
                // error below — both mean "nothing to do right now").
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
        }
    }

    tracing::info!(analyzer_id = %id, "draining in-flight tasks before shutdown");
    while in_flight.join_next().await.is_some() {}
}

async fn process_task(
    worker_id: String,
    client: Arc<DistributorClient>,
    processor: Arc<dyn Processor>,
    task_id: String,
    log_data: LogRecord,
    heartbeat_interval: Duration,
    stats: Arc<WorkerStats>,
) {
    stats.active_tasks.fetch_add(1, Ordering::Relaxed);

    client
        .send_status(&task_id, &worker_id, TaskStatus::InProgress, None)
        .await;

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await; // first tick fires immediately, already sent above

    let process_fut = processor.process(&log_data);
    tokio::pin!(process_fut);

    let result = loop {
        tokio::select! {
            result = &mut process_fut => break result,
            _ = heartbeat.tick() => {
                client.send_status(&task_id, &worker_id, TaskStatus::InProgress, None).await;
            }
        }
    };

    match result {
        Ok(()) => {
            client
                .send_status(&task_id, &worker_id, TaskStatus::Completed, None)
                .await;
            stats.total_processed.fetch_add(1, Ordering::Relaxed);
        }
        Err(reason) => {
            client
                .send_status(&task_id, &worker_id, TaskStatus::Failed, Some(&reason))
                .await;
            stats.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    stats.active_tasks.fetch_sub(1, Ordering::Relaxed);
}
