use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use distqueue_common::api::distributor::FleetReport;
use distqueue_common::config::{expand_weights, SupervisorConfig};
use tokio::sync::{watch, RwLock};

use crate::client::DistributorClient;
use crate::worker::{AnalyzerHandle, Processor, WorkerStatsSnapshot};

/// Per-analyzer weight deviation relative to the pool's mean — supplements
/// the plain stats endpoint with the "is this fleet balanced" view the
/// Python pool exposed via `get_distribution()`.
#[derive(Clone, Debug)]
pub struct AnalyzerDistribution {
    pub analyzer_id: String,
    pub weight: f64,
    pub share_of_total: f64,
    pub deviation_from_mean: f64,
}

#[derive(Clone, Debug, Default)]
pub struct PoolStats {
    pub analyzers: Vec<WorkerStatsSnapshot>,
    pub total_processed: u64,
    pub total_failed: u64,
    pub scaled_down_processed: u64,
    pub scaled_down_failed: u64,
}

/// Where the autoscale loop landed on its last decision. Exposed mainly so
/// tests can assert on it directly instead of re-deriving it from counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    WithinCooldown,
    ScalingUp,
    ScalingDown,
    Steady,
}

/// Manages a fleet of `AnalyzerHandle`s and, optionally, resizes it in
/// response to queue depth polled from the Distributor.
pub struct AnalyzerPool {
    config: SupervisorConfig,
    client: Arc<DistributorClient>,
    processor: Arc<dyn Processor>,
    analyzers: RwLock<Vec<AnalyzerHandle>>,
    next_index: AtomicU64,
    scaled_down_processed: AtomicU64,
    scaled_down_failed: AtomicU64,
    last_scale_at: RwLock<Option<Instant>>,
}

impl AnalyzerPool {
    pub fn new(config: SupervisorConfig, processor: Arc<dyn Processor>) -> Self {
        let client = Arc::new(DistributorClient::new(
            config.distributor_url.clone(),
            Duration::from_millis(config.work_request_timeout_ms),
        ));
        Self {
            config,
            client,
            processor,
            analyzers: RwLock::new(Vec::new()),
            next_index: AtomicU64::new(0),
            scaled_down_processed: AtomicU64::new(0),
            scaled_down_failed: AtomicU64::new(0),
            last_scale_at: RwLock::new(None),
        }
    }

    /// Spawn the configured starting fleet.
    pub async fn start(&self) {
        let weights = expand_weights(self.config.weights.as_ref(), self.config.num_analyzers as usize);
        let mut analyzers = self.analyzers.write().await;
        for weight in weights {
            analyzers.push(self.spawn_one(weight));
        }
        tracing::info!(count = analyzers.len(), "analyzer fleet started");
    }

    fn spawn_one(&self, weight: f64) -> AnalyzerHandle {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{}", self.config.analyzer_prefix, index);
        AnalyzerHandle::spawn(
            id,
            Arc::clone(&self.client),
            weight,
            Duration::from_millis(self.config.poll_interval_ms),
            Duration::from_millis(self.config.heartbeat_interval_ms),
            Arc::clone(&self.processor),
        )
    }

    /// Stop every analyzer, draining in-flight work first.
    pub async fn stop(&self) {
        let mut analyzers = self.analyzers.write().await;
        for analyzer in analyzers.iter_mut() {
            analyzer.stop().await;
        }
        analyzers.clear();
    }

    pub async fn scale_up(&self, count: u32) {
        let mut analyzers = self.analyzers.write().await;
        let max_size = self.config.resolved_max_size();
        let room = max_size.saturating_sub(analyzers.len() as u32);
        let to_add = count.min(room);
        if to_add == 0 {
            return;
        }
        let weight = self.config.scale_weight;
        for _ in 0..to_add {
            analyzers.push(self.spawn_one(weight));
        }
        tracing::info!(added = to_add, total = analyzers.len(), "scaled up");
        *self.last_scale_at.write().await = Some(Instant::now());
    }

    pub async fn scale_down(&self, count: u32) {
        let mut analyzers = self.analyzers.write().await;
        let min_size = self.config.resolved_min_size();
        let room = (analyzers.len() as u32).saturating_sub(min_size);
        let to_remove = count.min(room) as usize;
        if to_remove == 0 {
            return;
        }

        for mut victim in analyzers.split_off(analyzers.len() - to_remove) {
            let snapshot = victim.snapshot();
            self.scaled_down_processed
                .fetch_add(snapshot.total_processed, Ordering::Relaxed);
            self.scaled_down_failed
                .fetch_add(snapshot.total_failed, Ordering::Relaxed);
            victim.stop().await;
        }
        tracing::info!(removed = to_remove, total = analyzers.len(), "scaled down");
        *self.last_scale_at.write().await = Some(Instant::now());
    }

    pub async fn stats(&self) -> PoolStats {
        let analyzers = self.analyzers.read().await;
        let snapshots: Vec<WorkerStatsSnapshot> = analyzers.iter().map(AnalyzerHandle::snapshot).collect();
        let total_processed: u64 = snapshots.iter().map(|s| s.total_processed).sum();
        let total_failed: u64 = snapshots.iter().map(|s| s.total_failed).sum();
        PoolStats {
            analyzers: snapshots,
            total_processed: total_processed + self.scaled_down_processed.load(Ordering::Relaxed),
            total_failed: total_failed + self.scaled_down_failed.load(Ordering::Relaxed),
            scaled_down_processed: self.scaled_down_processed.load(Ordering::Relaxed),
            scaled_down_failed: self.scaled_down_failed.load(Ordering::Relaxed),
        }
    }

    pub async fn get_distribution(&self) -> Vec<AnalyzerDistribution> {
        let analyzers = self.analyzers.read().await;
        let total_weight: f64 = analyzers.iter().map(|a| a.weight).sum();
        let mean = if analyzers.is_empty() {
            0.0
        } else {
            total_weight / analyzers.len() as f64
        };
        analyzers
            .iter()
            .map(|a| AnalyzerDistribution {
                analyzer_id: a.id.clone(),
                weight: a.weight,
                share_of_total: if total_weight > 0.0 { a.weight / total_weight } else { 0.0 },
                deviation_from_mean: if mean > 0.0 { (a.weight - mean) / mean } else { 0.0 },
            })
            .collect()
    }

    pub async fn wait_for_idle(&self, poll_interval: Duration) {
        loop {
            let analyzers = self.analyzers.read().await;
            let idle = analyzers
                .iter()
                .map(AnalyzerHandle::snapshot)
                .all(|s| s.active_tasks == 0);
            drop(analyzers);
            if idle {
                return;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn fleet_size(&self) -> (u32, u32) {
        let analyzers = self.analyzers.read().await;
        let total = analyzers.len() as u32;
        let active = analyzers
            .iter()
            .map(AnalyzerHandle::snapshot)
            .filter(|s| s.active_tasks > 0)
            .count() as u32;
        (total, active)
    }

    /// One decision cycle of the autoscale control loop: evaluate the
    /// cooldown/threshold state machine against an already-polled queue
    /// depth, act if warranted. Returns the state reached, mainly so
    /// callers/tests can assert on it.
    async fn evaluate_once(&self, queue_depth: u64) -> ControllerState {
        if let Some(last) = *self.last_scale_at.read().await {
            if last.elapsed() < Duration::from_secs(self.config.scale_cooldown_seconds) {
                return ControllerState::WithinCooldown;
            }
        }

        if queue_depth >= self.config.scale_up_threshold {
            let current_size = self.analyzers.read().await.len() as u32;
            if current_size < self.config.resolved_max_size() {
                self.scale_up(self.config.scale_up_count).await;
                return ControllerState::ScalingUp;
            }
        }

        if queue_depth <= self.config.scale_down_threshold {
            let current_size = self.analyzers.read().await.len() as u32;
            if current_size > self.config.resolved_min_size() {
                self.scale_down(self.config.scale_down_count).await;
                return ControllerState::ScalingDown;
            }
        }

        ControllerState::Steady
    }

    /// Runs until `shutdown_rx` reports true, periodically evaluating the
    /// scale decision and pushing a fleet report to the Distributor so its
    /// `GET /metrics` reflects actual fleet size rather than guessing.
    pub async fn run_autoscaler(&self, mut shutdown_rx: watch::Receiver<bool>) {
        if !self.config.enable_autoscaling {
            tracing::info!("autoscaling disabled, fleet size fixed");
        }

        let interval = Duration::from_secs(self.config.scale_check_interval_seconds);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
            if *shutdown_rx.borrow() {
                break;
            }

            let (total, active) = self.fleet_size().await;
            self.client
                .report_fleet(FleetReport {
                    total_analyzers: total,
                    active_analyzers: active,
                })
                .await;

            if self.config.enable_autoscaling {
                let queue_depth = self.client.queue_depth().await;
                let state = self.evaluate_once(queue_depth).await;
                tracing::debug!(?state, queue_depth, "autoscale tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::SimulatedProcessor;

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            num_analyzers: 2,
            min_size: Some(2),
            max_size: Some(5),
            scale_up_count: 2,
            scale_down_count: 1,
            ..SupervisorConfig::default()
        }
    }

    fn test_pool() -> AnalyzerPool {
        let processor: Arc<dyn Processor> = Arc::new(SimulatedProcessor::new(Duration::from_millis(1)));
        AnalyzerPool::new(test_config(), processor)
    }

    #[tokio::test]
    async fn scale_up_respects_max_size() {
        let pool = test_pool();
        pool.start().await;
        pool.scale_up(10).await;
        let stats = pool.stats().await;
        assert_eq!(stats.analyzers.len(), 5);
        pool.stop().await;
    }

    #[tokio::test]
    async fn evaluate_once_is_steady_at_max_size_even_past_threshold() {
        let pool = test_pool();
        pool.start().await;
        pool.scale_up(10).await; // saturate to max_size (5)
        assert_eq!(pool.stats().await.analyzers.len(), 5);

        // Cooldown from the saturating scale_up above would also block a
        // real decision; clear it so this test isolates the max-size gate.
        *pool.last_scale_at.write().await = None;

        let state = pool.evaluate_once(pool.config.scale_up_threshold).await;
        assert_eq!(state, ControllerState::Steady);
        assert_eq!(pool.stats().await.analyzers.len(), 5);
        pool.stop().await;
    }

    #[tokio::test]
    async fn scale_down_respects_min_size() {
        let pool = test_pool();
        pool.start().await;
        pool.scale_down(10).await;
        let stats = pool.stats().await;
        assert_eq!(stats.analyzers.len(), 2);
        pool.stop().await;
    }

    #[tokio::test]
    async fn scale_down_preserves_historical_stats() {
        let pool = test_pool();
        pool.start().await;
        pool.scale_up(1).await;
        pool.scale_down(1).await;
        let stats = pool.stats().await;
        assert_eq!(stats.analyzers.len(), 2);
        assert_eq!(stats.scaled_down_processed, 0);
        assert_eq!(stats.scaled_down_failed, 0);
        pool.stop().await;
    }

    #[tokio::test]
    async fn evaluate_once_scales_up_past_threshold() {
        let pool = test_pool();
        pool.start().await;
        let state = pool.evaluate_once(pool.config.scale_up_threshold).await;
        assert_eq!(state, ControllerState::ScalingUp);
        assert_eq!(pool.stats().await.analyzers.len(), 4);
        pool.stop().await;
    }

    #[tokio::test]
    async fn evaluate_once_respects_cooldown_after_a_scale() {
        let pool = test_pool();
        pool.start().await;
        pool.scale_up(1).await;
        let state = pool.evaluate_once(pool.config.scale_up_threshold).await;
        assert_eq!(state, ControllerState::WithinCooldown);
        pool.stop().await;
    }

    #[tokio::test]
    async fn evaluate_once_is_steady_between_thresholds() {
        let pool = test_pool();
        pool.start().await;
        let state = pool
            .evaluate_once((pool.config.scale_up_threshold + pool.config.scale_down_threshold) / 2)
            .await;
        assert_eq!(state, ControllerState::Steady);
        pool.stop().await;
    }

    #[tokio::test]
    async fn distribution_reports_even_split_for_equal_weights() {
        let pool = test_pool();
        pool.start().await;
        let distribution = pool.get_distribution().await;
        assert_eq!(distribution.len(), 2);
        for d in distribution {
            assert!((d.deviation_from_mean).abs() < 1e-9);
        }
        pool.stop().await;
    }
}
