//! # Task Manager
//!
//! Owns the shared [`TaskQueue`] and a fixed-size set of long-lived workers.
//! Producers submit closures here and poll outcomes by task id; terminal
//! results transfer to a completed-task map retained for status queries.
//!
//! There are no global singletons: construct one manager per process (or per
//! test) and pass references into producers.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{Result, TaskForgeError};
use crate::queue::{
    QueueConfig, QueueStats, Task, TaskId, TaskOutput, TaskQueue, TaskResult, TaskStatus,
};

use super::worker::TaskWorker;

/// Execution layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Number of concurrent worker execution units
    pub worker_count: usize,

    /// How long a worker blocks on an empty queue before rechecking the
    /// shutdown flag, in milliseconds
    pub dequeue_timeout_ms: u64,

    /// Default maximum attempts for tasks submitted via `submit`
    pub default_max_retries: u32,

    /// Default fixed delay between attempts, in seconds
    pub default_retry_delay_seconds: u64,

    /// How long `shutdown` waits for workers to drain, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            dequeue_timeout_ms: 250,
            default_max_retries: 3,
            default_retry_delay_seconds: 5,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ExecutionConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(TaskForgeError::Configuration(
                "worker_count must be greater than 0".to_string(),
            ));
        }
        if self.dequeue_timeout_ms == 0 {
            return Err(TaskForgeError::Configuration(
                "dequeue_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn default_retry_delay(&self) -> Duration {
        Duration::from_secs(self.default_retry_delay_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Non-terminal status of a task currently owned by the queue or a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProgress {
    pub status: TaskStatus,
    pub attempts: u32,
}

/// Status snapshot returned to producers polling by task id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub attempts: u32,
    /// Return value of the final attempt, for Success
    pub value: Option<serde_json::Value>,
    /// Error description, for Failed
    pub error: Option<String>,
    /// Final attempt duration, once terminal
    pub duration: Option<Duration>,
}

#[derive(Debug, Default)]
pub(crate) struct ExecutionCounters {
    pub submitted: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub retried: AtomicU64,
}

/// State shared between the manager and its workers
pub(crate) struct ExecutionContext {
    pub queue: Arc<TaskQueue>,
    pub completed: DashMap<TaskId, TaskResult>,
    pub progress: DashMap<TaskId, TaskProgress>,
    pub running: AtomicBool,
    pub config: ExecutionConfig,
    pub counters: ExecutionCounters,
}

impl ExecutionContext {
    /// Terminal results transfer ownership to the completed map
    pub(crate) fn record_terminal(&self, result: TaskResult) {
        self.progress.insert(
            result.task_id,
            TaskProgress {
                status: result.status,
                attempts: result.attempts,
            },
        );
        self.completed.insert(result.task_id, result);
    }
}

/// Aggregate manager statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStats {
    pub worker_count: usize,
    pub queue: QueueStats,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retried: u64,
}

/// Pool of concurrent workers pulling from one shared priority queue.
pub struct TaskManager {
    ctx: Arc<ExecutionContext>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl TaskManager {
    /// Create a manager with its own queue. Workers are not spawned until
    /// [`start`](Self::start) is called, so tasks submitted before `start`
    /// are dequeued in strict priority order once execution begins.
    pub fn new(execution: ExecutionConfig, queue: QueueConfig) -> Self {
        Self {
            ctx: Arc::new(ExecutionContext {
                queue: Arc::new(TaskQueue::new(queue)),
                completed: DashMap::new(),
                progress: DashMap::new(),
                running: AtomicBool::new(false),
                config: execution,
                counters: ExecutionCounters::default(),
            }),
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Create a manager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ExecutionConfig::default(), QueueConfig::default())
    }

    /// Spawn the worker pool. Idempotent; a second call is a no-op.
    pub fn start(&self) {
        if self.ctx.running.swap(true, Ordering::AcqRel) {
            warn!("Task manager already running");
            return;
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..self.ctx.config.worker_count {
            let worker = TaskWorker::new(worker_id, Arc::clone(&self.ctx));
            workers.push(tokio::spawn(worker.run()));
        }

        info!(
            worker_count = self.ctx.config.worker_count,
            "Task manager started"
        );
    }

    /// Submit an async closure as a task with default policy (normal
    /// priority, configured retry defaults). Returns the task id for
    /// later polling via [`get_status`](Self::get_status).
    pub async fn submit<F, Fut>(&self, name: &str, body: F) -> Result<TaskId>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutput> + Send + 'static,
    {
        let task = Task::new(name, body).with_retry_policy(
            self.ctx.config.default_max_retries,
            self.ctx.config.default_retry_delay(),
        );
        self.submit_task(task).await
    }

    /// Submit a fully-configured task
    pub async fn submit_task(&self, task: Task) -> Result<TaskId> {
        let id = task.id;
        let name = task.name.clone();

        self.ctx.progress.insert(
            id,
            TaskProgress {
                status: TaskStatus::Queued,
                attempts: 0,
            },
        );

        if !self.ctx.queue.enqueue(task).await {
            self.ctx.progress.remove(&id);
            return Err(TaskForgeError::QueueRejected(format!(
                "task '{name}' ({id}) was not accepted by the queue"
            )));
        }

        self.ctx.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Status of a task by id: live progress while owned by the queue or a
    /// worker, the full terminal result afterwards.
    pub fn get_status(&self, id: TaskId) -> Option<TaskStatusReport> {
        if let Some(result) = self.ctx.completed.get(&id) {
            return Some(TaskStatusReport {
                task_id: id,
                status: result.status,
                attempts: result.attempts,
                value: result.value.clone(),
                error: result.error.clone(),
                duration: Some(result.duration),
            });
        }

        self.ctx.progress.get(&id).map(|progress| TaskStatusReport {
            task_id: id,
            status: progress.status,
            attempts: progress.attempts,
            value: None,
            error: None,
            duration: None,
        })
    }

    /// Full terminal result for a completed task
    pub fn get_result(&self, id: TaskId) -> Option<TaskResult> {
        self.ctx.completed.get(&id).map(|r| r.clone())
    }

    /// Cancel a task that has not started executing. Returns `false` once the
    /// task is Running or terminal; a worker always runs a dequeued task to
    /// completion.
    pub async fn cancel(&self, id: TaskId) -> bool {
        match self.ctx.queue.cancel(id).await {
            Some(task) => {
                info!(task_id = %id, task_name = %task.name, "Task cancelled before execution");
                self.ctx.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                self.ctx.record_terminal(TaskResult::cancelled(id));
                true
            }
            None => false,
        }
    }

    /// Shared queue handle, for depth inspection
    pub fn queue(&self) -> Arc<TaskQueue> {
        Arc::clone(&self.ctx.queue)
    }

    /// Aggregate statistics snapshot
    pub async fn stats(&self) -> ManagerStats {
        ManagerStats {
            worker_count: self.ctx.config.worker_count,
            queue: self.ctx.queue.stats().await,
            submitted: self.ctx.counters.submitted.load(Ordering::Relaxed),
            succeeded: self.ctx.counters.succeeded.load(Ordering::Relaxed),
            failed: self.ctx.counters.failed.load(Ordering::Relaxed),
            cancelled: self.ctx.counters.cancelled.load(Ordering::Relaxed),
            retried: self.ctx.counters.retried.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker pool. Workers finish their in-flight task, observe the
    /// cleared running flag at their next dequeue timeout, and exit; any
    /// worker still alive after the shutdown timeout is aborted.
    pub async fn shutdown(&self) {
        if !self.ctx.running.swap(false, Ordering::AcqRel) {
            return;
        }

        info!("Task manager shutting down");
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();

        let drain = async {
            for handle in &handles {
                while !handle.is_finished() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        };

        if tokio::time::timeout(self.ctx.config.shutdown_timeout(), drain)
            .await
            .is_err()
        {
            warn!("Shutdown timeout elapsed, aborting remaining workers");
            for handle in &handles {
                handle.abort();
            }
        }

        info!("Task manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn fast_manager(worker_count: usize) -> TaskManager {
        TaskManager::new(
            ExecutionConfig {
                worker_count,
                dequeue_timeout_ms: 20,
                default_max_retries: 1,
                default_retry_delay_seconds: 1,
                shutdown_timeout_ms: 2_000,
            },
            QueueConfig {
                poll_interval_ms: 10,
                ..QueueConfig::default()
            },
        )
    }

    async fn wait_terminal(manager: &TaskManager, id: TaskId) -> TaskStatusReport {
        for _ in 0..500 {
            if let Some(report) = manager.get_status(id) {
                if report.status.is_terminal() {
                    return report;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} did not reach a terminal state");
    }

    #[tokio::test]
    async fn test_submit_and_succeed() {
        let manager = fast_manager(2);
        manager.start();

        let id = manager
            .submit("answer", || async { Ok(json!(42)) })
            .await
            .unwrap();

        let report = wait_terminal(&manager, id).await;
        assert_eq!(report.status, TaskStatus::Success);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.value, Some(json!(42)));
        assert!(report.duration.is_some());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failing_task_attempted_exactly_max_retries_times() {
        let manager = fast_manager(1);
        manager.start();

        let calls = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&calls);
        let task = Task::new("always-fails", move || {
            let calls = Arc::clone(&observed);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("nope"))
            }
        })
        .with_retry_policy(3, Duration::from_millis(20));

        let id = manager.submit_task(task).await.unwrap();
        let report = wait_terminal(&manager, id).await;

        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(report.error.unwrap().contains("nope"));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let manager = fast_manager(1);
        manager.start();

        let calls = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&calls);
        let task = Task::new("one-shot", move || {
            let calls = Arc::clone(&observed);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("boom"))
            }
        })
        .with_retry_policy(0, Duration::from_millis(10));

        let id = manager.submit_task(task).await.unwrap();
        let report = wait_terminal(&manager, id).await;

        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_body_does_not_kill_worker() {
        let manager = fast_manager(1);
        manager.start();

        let bad = manager
            .submit("panics", || async { panic!("kaboom") })
            .await
            .unwrap();
        let report = wait_terminal(&manager, bad).await;
        assert_eq!(report.status, TaskStatus::Failed);
        assert!(report.error.unwrap().contains("kaboom"));

        // The single worker must still process subsequent tasks
        let good = manager
            .submit("after-panic", || async { Ok(json!("alive")) })
            .await
            .unwrap();
        let report = wait_terminal(&manager, good).await;
        assert_eq!(report.status, TaskStatus::Success);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_before_start_and_not_after_terminal() {
        let manager = fast_manager(1);

        let id = manager
            .submit("cancellable", || async { Ok(json!(())) })
            .await
            .unwrap();

        // Workers not started yet, so the task is still queued
        assert!(manager.cancel(id).await);
        let report = manager.get_status(id).unwrap();
        assert_eq!(report.status, TaskStatus::Cancelled);

        // Cancelling again is a no-op
        assert!(!manager.cancel(id).await);
    }

    #[tokio::test]
    async fn test_per_attempt_timeout_fails_task() {
        let manager = fast_manager(1);
        manager.start();

        let task = Task::new("sleeper", || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!(()))
        })
        .with_retry_policy(0, Duration::from_millis(10))
        .with_timeout(Duration::from_millis(50));

        let id = manager.submit_task(task).await.unwrap();
        let report = wait_terminal(&manager, id).await;

        assert_eq!(report.status, TaskStatus::Failed);
        assert!(report.error.unwrap().contains("timed out"));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_dependencies_are_advisory_only() {
        // The dependency list is tracked but never blocks scheduling; this
        // pins the behavior down rather than leaving it ambiguous.
        let manager = fast_manager(1);
        manager.start();

        let phantom = uuid::Uuid::new_v4();
        let task = Task::new("independent", || async { Ok(json!("ran anyway")) })
            .with_dependency(phantom);
        assert_eq!(task.dependencies, vec![phantom]);

        let id = manager.submit_task(task).await.unwrap();
        let report = wait_terminal(&manager, id).await;
        assert_eq!(report.status, TaskStatus::Success);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let manager = fast_manager(2);
        manager.start();

        let ok = manager.submit("ok", || async { Ok(json!(())) }).await.unwrap();
        let task = Task::new("bad", || async { Err(anyhow::anyhow!("no")) })
            .with_retry_policy(0, Duration::from_millis(10));
        let bad = manager.submit_task(task).await.unwrap();

        wait_terminal(&manager, ok).await;
        wait_terminal(&manager, bad).await;

        let stats = manager.stats().await;
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);

        manager.shutdown().await;
    }
}
