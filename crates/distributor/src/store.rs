use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use distqueue_common::types::LogRecord;
use distqueue_common::TaskId;
use tokio::sync::Mutex;

/// Server-side task metadata. The payload lives separately in the data
/// store, keyed by the same id (see the module doc on `TaskStore`).
#[derive(Clone, Debug)]
pub struct TaskRecord {
    pub id: TaskId,
    pub created_at: DateTime<Utc>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl TaskRecord {
    fn new(max_retries: u32) -> Self {
        Self {
            id: TaskId::new(),
            created_at: Utc::now(),
            assigned_to: None,
            assigned_at: None,
            last_heartbeat: None,
            retry_count: 0,
            max_retries,
        }
    }

    fn assign_to(&mut self, worker_id: &str) {
        self.assigned_to = Some(worker_id.to_string());
        self.assigned_at = Some(Utc::now());
        self.last_heartbeat = Some(Utc::now());
    }

    /// Whether this task's heartbeat is older than `timeout`.
    fn is_stale(&self, timeout: chrono::Duration) -> bool {
        match self.last_heartbeat {
            Some(hb) => Utc::now() - hb > timeout,
            None => false,
        }
    }

    /// Reset for requeuing. Returns `false` if the retry budget is
    /// exhausted, in which case the caller should mark the task failed
    /// instead of requeuing it.
    fn reset_for_retry(&mut self) -> bool {
        if self.retry_count >= self.max_retries {
            return false;
        }
        self.assigned_to = None;
        self.assigned_at = None;
        self.last_heartbeat = None;
        self.retry_count += 1;
        true
    }
}

/// Tasks currently assigned, plus their terminal history. Guarded by one
/// lock since every transition here (assignment removal, completion,
/// requeue) is a move between these three collections and must be atomic
/// with respect to the others.
#[derive(Default)]
struct InProgressState {
    in_progress: HashMap<TaskId, TaskRecord>,
    completed: HashMap<TaskId, TaskRecord>,
    failed: HashMap<TaskId, TaskRecord>,
}

/// Outcome of a monitor-driven requeue attempt.
pub enum RequeueOutcome {
    Requeued { retry_count: u32 },
    RetriesExhausted,
}

/// In-memory task store and dispatch queue.
///
/// Lock order is queue → in-progress → data, mirroring the dispatch
/// contract: `submit` takes queue then data, `pull` takes queue (releases),
/// then in-progress, then data, `status` takes in-progress then data. The
/// monitor's requeue path acquires in-progress first (to snapshot and
/// remove), releases, then acquires queue (to prepend) — the reverse order
/// of `pull` — which is safe only because it never holds both at once.
pub struct TaskStore {
    queue: Mutex<VecDeque<TaskRecord>>,
    in_progress_state: Mutex<InProgressState>,
    data: Mutex<HashMap<TaskId, LogRecord>>,
    max_retries: u32,

    total_received: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
    total_requeued: AtomicU64,
}

impl TaskStore {
    pub fn new(max_retries: u32) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            in_progress_state: Mutex::new(InProgressState::default()),
            data: Mutex::new(HashMap::new()),
            max_retries,
            total_received: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_requeued: AtomicU64::new(0),
        }
    }

    /// Append a new task to the tail of the queue and store its payload.
    pub async fn submit(&self, record: LogRecord) -> TaskId {
        let task = TaskRecord::new(self.max_retries);
        let task_id = task.id;

        {
            let mut queue = self.queue.lock().await;
            queue.push_back(task);
        }
        self.total_received.fetch_add(1, Ordering::Relaxed);

        {
            let mut data = self.data.lock().await;
            data.insert(task_id, record);
        }

        task_id
    }

    /// Pop the head of the queue and assign it to `worker_id`. Returns
    /// `None` if the queue is empty, or if the task's payload has vanished
    /// (an invariant violation logged by the caller, not reinserted).
    pub async fn pull(&self, worker_id: &str) -> Option<(TaskId, LogRecord)> {
        let mut task = {
            let mut queue = self.queue.lock().await;
            queue.pop_front()?
        };

        task.assign_to(worker_id);
        let task_id = task.id;

        {
            let mut state = self.in_progress_state.lock().await;
            state.in_progress.insert(task_id, task);
        }

        let payload = {
            let data = self.data.lock().await;
            data.get(&task_id).cloned()
        };

        match payload {
            Some(payload) => Some((task_id, payload)),
            None => {
                // Invariant violation: a queued task must have a payload.
                // Drop the dangling assignment rather than serve empty data.
                let mut state = self.in_progress_state.lock().await;
                state.in_progress.remove(&task_id);
                None
            }
        }
    }

    /// Record a heartbeat for an in-progress task. Returns `false` if the
    /// task is not currently in progress (already completed, failed, or
    /// requeued out from under the caller).
    pub async fn heartbeat(&self, task_id: TaskId) -> bool {
        let mut state = self.in_progress_state.lock().await;
        match state.in_progress.get_mut(&task_id) {
            Some(task) => {
                task.last_heartbeat = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Move an in-progress task to completed and drop its payload. Returns
    /// `false` if the task was not in progress.
    pub async fn complete(&self, task_id: TaskId) -> bool {
        let moved = {
            let mut state = self.in_progress_state.lock().await;
            match state.in_progress.remove(&task_id) {
                Some(task) => {
                    state.completed.insert(task_id, task);
                    true
                }
                None => false,
            }
        };
        if moved {
            self.total_completed.fetch_add(1, Ordering::Relaxed);
            let mut data = self.data.lock().await;
            data.remove(&task_id);
        }
        moved
    }

    /// Move an in-progress task to failed and drop its payload. Returns
    /// `false` if the task was not in progress.
    pub async fn fail(&self, task_id: TaskId) -> bool {
        let moved = {
            let mut state = self.in_progress_state.lock().await;
            match state.in_progress.remove(&task_id) {
                Some(task) => {
                    state.failed.insert(task_id, task);
                    true
                }
                None => false,
            }
        };
        if moved {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
            let mut data = self.data.lock().await;
            data.remove(&task_id);
        }
        moved
    }

    /// Scan in-progress tasks for ones whose heartbeat has aged past
    /// `timeout`, requeuing (retry-first, prepended to the queue head) or
    /// failing them as their retry budget allows.
    pub async fn requeue_timed_out(
        &self,
        timeout: chrono::Duration,
    ) -> Vec<(TaskId, RequeueOutcome)> {
        let stale_ids: Vec<TaskId> = {
            let state = self.in_progress_state.lock().await;
            state
                .in_progress
                .iter()
                .filter(|(_, task)| task.is_stale(timeout))
                .map(|(id, _)| *id)
                .collect()
        };

        let mut outcomes = Vec::with_capacity(stale_ids.len());
        for task_id in stale_ids {
            let mut state = self.in_progress_state.lock().await;
            let Some(mut task) = state.in_progress.remove(&task_id) else {
                continue;
            };

            if task.reset_for_retry() {
                let retry_count = task.retry_count;
                drop(state);
                {
                    let mut queue = self.queue.lock().await;
                    queue.push_front(task);
                }
                self.total_requeued.fetch_add(1, Ordering::Relaxed);
                outcomes.push((task_id, RequeueOutcome::Requeued { retry_count }));
            } else {
                state.failed.insert(task_id, task);
                drop(state);
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                {
                    let mut data = self.data.lock().await;
                    data.remove(&task_id);
                }
                outcomes.push((task_id, RequeueOutcome::RetriesExhausted));
            }
        }
        outcomes
    }

    pub async fn queue_depth(&self) -> u64 {
        self.queue.lock().await.len() as u64
    }

    pub async fn in_progress_count(&self) -> u64 {
        self.in_progress_state.lock().await.in_progress.len() as u64
    }

    pub async fn completed_count(&self) -> u64 {
        self.in_progress_state.lock().await.completed.len() as u64
    }

    pub async fn failed_count(&self) -> u64 {
        self.in_progress_state.lock().await.failed.len() as u64
    }

    pub fn total_received(&self) -> u64 {
        self.total_received.load(Ordering::Relaxed)
    }

    pub fn total_completed(&self) -> u64 {
        self.total_completed.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    pub fn total_requeued(&self) -> u64 {
        self.total_requeued.load(Ordering::Relaxed)
    }

    /// Clear all collections and counters. Test/harness use only.
    pub async fn reset(&self) {
        self.queue.lock().await.clear();
        {
            let mut state = self.in_progress_state.lock().await;
            state.in_progress.clear();
            state.completed.clear();
            state.failed.clear();
        }
        self.data.lock().await.clear();
        self.total_received.store(0, Ordering::Relaxed);
        self.total_completed.store(0, Ordering::Relaxed);
        self.total_failed.store(0, Ordering::Relaxed);
        self.total_requeued.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distqueue_common::types::LogLevel;

    fn sample_record() -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: "hello".into(),
            source: "test".into(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn submit_then_pull_round_trips_payload() {
        let store = TaskStore::new(3);
        let task_id = store.submit(sample_record()).await;

        let (pulled_id, payload) = store.pull("worker-1").await.unwrap();
        assert_eq!(pulled_id, task_id);
        assert_eq!(payload.message, "hello");
        assert_eq!(store.queue_depth().await, 0);
        assert_eq!(store.in_progress_count().await, 1);
    }

    #[tokio::test]
    async fn pull_on_empty_queue_returns_none() {
        let store = TaskStore::new(3);
        assert!(store.pull("worker-1").await.is_none());
    }

    #[tokio::test]
    async fn complete_drops_payload_and_counts() {
        let store = TaskStore::new(3);
        let task_id = store.submit(sample_record()).await;
        store.pull("worker-1").await.unwrap();

        assert!(store.complete(task_id).await);
        assert_eq!(store.completed_count().await, 1);
        assert_eq!(store.in_progress_count().await, 0);
        assert_eq!(store.total_completed(), 1);
    }

    #[tokio::test]
    async fn requeue_prepends_ahead_of_fresh_submissions() {
        let store = TaskStore::new(3);
        let a = store.submit(sample_record()).await;
        store.pull("worker-1").await.unwrap(); // a now in progress

        // Force a's heartbeat to look stale.
        {
            let mut state = store.in_progress_state.lock().await;
            let task = state.in_progress.get_mut(&a).unwrap();
            task.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(60));
        }

        let _b = store.submit(sample_record()).await;

        let outcomes = store.requeue_timed_out(chrono::Duration::seconds(30)).await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].1, RequeueOutcome::Requeued { retry_count: 1 }));

        let (next_id, _) = store.pull("worker-2").await.unwrap();
        assert_eq!(next_id, a, "retried task must be served before fresh ones");
    }

    #[tokio::test]
    async fn exhausting_retries_marks_task_failed() {
        let store = TaskStore::new(1);
        let a = store.submit(sample_record()).await;
        store.pull("worker-1").await.unwrap();

        {
            let mut state = store.in_progress_state.lock().await;
            let task = state.in_progress.get_mut(&a).unwrap();
            task.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(60));
        }
        let outcomes = store.requeue_timed_out(chrono::Duration::seconds(30)).await;
        assert!(matches!(outcomes[0].1, RequeueOutcome::Requeued { .. }));

        store.pull("worker-2").await.unwrap();
        {
            let mut state = store.in_progress_state.lock().await;
            let task = state.in_progress.get_mut(&a).unwrap();
            task.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(60));
        }
        let outcomes = store.requeue_timed_out(chrono::Duration::seconds(30)).await;
        assert!(matches!(outcomes[0].1, RequeueOutcome::RetriesExhausted));
        assert_eq!(store.failed_count().await, 1);
        assert_eq!(store.queue_depth().await, 0);
    }
}
