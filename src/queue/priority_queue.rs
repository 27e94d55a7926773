//! # Priority Task Queue
//!
//! One FIFO container per priority level behind a single coarse lock.
//! Dequeue always drains the highest-priority non-empty level first.
//!
//! Strict priority is a deliberate simplicity trade-off: a continuous stream
//! of critical tasks can starve low-priority tasks indefinitely. There is no
//! starvation protection, and reimplementations must preserve this or flag it.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use super::task::{Task, TaskId, TaskPriority, TaskStatus};

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum queued tasks per priority level
    pub capacity_per_priority: usize,

    /// Poll interval while waiting for a ready task, in milliseconds.
    /// Bounds how stale a future `scheduled_at` readiness check can be.
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity_per_priority: 10_000,
            poll_interval_ms: 50,
        }
    }
}

impl QueueConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_per_priority == 0 {
            return Err("capacity_per_priority must be greater than 0".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Snapshot of queue depth per priority level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub depth_per_priority: [usize; TaskPriority::LEVELS],
    pub total: usize,
}

struct QueueInner {
    /// FIFO container per priority level, indexed by `TaskPriority::index`
    levels: [VecDeque<Task>; TaskPriority::LEVELS],

    /// Ids currently present in the queue, for duplicate rejection
    ids: HashSet<TaskId>,
}

/// Priority-ordered holding area for tasks.
///
/// All internal containers are guarded by one coarse mutex; this bounds
/// throughput under heavy contention but keeps the ordering invariants easy
/// to reason about.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    config: QueueConfig,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                levels: Default::default(),
                ids: HashSet::new(),
            }),
            notify: Notify::new(),
            config,
        }
    }

    /// Submit a task to its priority level.
    ///
    /// Returns `false` if a task with the same id is already present or the
    /// level is at capacity; the task is dropped in that case.
    pub async fn enqueue(&self, mut task: Task) -> bool {
        let mut inner = self.inner.lock().await;

        if inner.ids.contains(&task.id) {
            warn!(task_id = %task.id, task_name = %task.name, "Duplicate task id rejected");
            return false;
        }

        let level = &inner.levels[task.priority.index()];
        if level.len() >= self.config.capacity_per_priority {
            warn!(
                task_id = %task.id,
                priority = %task.priority,
                capacity = self.config.capacity_per_priority,
                "Priority level at capacity, task rejected"
            );
            return false;
        }

        task.status = TaskStatus::Queued;
        debug!(
            task_id = %task.id,
            task_name = %task.name,
            priority = %task.priority,
            "Task queued"
        );

        inner.ids.insert(task.id);
        inner.levels[task.priority.index()].push_back(task);
        drop(inner);

        self.notify.notify_one();
        true
    }

    /// Remove and return the highest-priority ready task, blocking up to
    /// `timeout` for one to become available.
    ///
    /// A task is ready only once its `scheduled_at` has passed; tasks that
    /// are not yet ready are skipped in place and re-offered on the next
    /// poll, so a distant-future task never blocks unrelated ready tasks.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Task> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before scanning so an enqueue between the
            // scan and the wait still wakes us.
            let notified = self.notify.notified();

            if let Some(task) = self.take_ready().await {
                return Some(task);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            // Bounded wait: a notify covers new arrivals, the sleep covers
            // queued tasks whose scheduled_at becomes due.
            let wait = self.config.poll_interval().min(deadline - now);
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Single scan over the levels in priority order for the first ready task
    async fn take_ready(&self) -> Option<Task> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        for priority in TaskPriority::ALL {
            let level = &mut inner.levels[priority.index()];
            if let Some(pos) = level.iter().position(|task| task.is_ready(now)) {
                let task = level.remove(pos)?;
                inner.ids.remove(&task.id);
                return Some(task);
            }
        }

        None
    }

    /// Cancel a queued task. Only Pending/Queued tasks can be cancelled;
    /// returns the removed task so the caller can record the outcome.
    pub async fn cancel(&self, id: TaskId) -> Option<Task> {
        let mut inner = self.inner.lock().await;

        for priority in TaskPriority::ALL {
            let level = &mut inner.levels[priority.index()];
            if let Some(pos) = level.iter().position(|task| task.id == id) {
                if !level[pos].status.is_cancellable() {
                    return None;
                }
                let mut task = level.remove(pos)?;
                inner.ids.remove(&task.id);
                task.status = TaskStatus::Cancelled;
                debug!(task_id = %task.id, task_name = %task.name, "Task cancelled");
                return Some(task);
            }
        }

        None
    }

    /// Whether a task id is currently queued
    pub async fn contains(&self, id: TaskId) -> bool {
        self.inner.lock().await.ids.contains(&id)
    }

    /// Total queued tasks across all levels
    pub async fn len(&self) -> usize {
        self.inner.lock().await.ids.len()
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.ids.is_empty()
    }

    /// Depth snapshot per priority level
    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        let mut depth_per_priority = [0usize; TaskPriority::LEVELS];
        for priority in TaskPriority::ALL {
            depth_per_priority[priority.index()] = inner.levels[priority.index()].len();
        }
        QueueStats {
            depth_per_priority,
            total: inner.ids.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    fn quick(name: &str) -> Task {
        Task::new(name, || async { Ok(Value::Null) })
    }

    #[tokio::test]
    async fn test_strict_priority_order() {
        let queue = TaskQueue::new(QueueConfig::default());

        assert!(queue.enqueue(quick("low").with_priority(TaskPriority::Low)).await);
        assert!(
            queue
                .enqueue(quick("critical").with_priority(TaskPriority::Critical))
                .await
        );
        assert!(
            queue
                .enqueue(quick("normal").with_priority(TaskPriority::Normal))
                .await
        );

        let order: Vec<String> = [
            queue.dequeue(Duration::from_millis(10)).await.unwrap(),
            queue.dequeue(Duration::from_millis(10)).await.unwrap(),
            queue.dequeue(Duration::from_millis(10)).await.unwrap(),
        ]
        .into_iter()
        .map(|t| t.name)
        .collect();

        assert_eq!(order, vec!["critical", "normal", "low"]);
    }

    #[tokio::test]
    async fn test_fifo_within_priority() {
        let queue = TaskQueue::new(QueueConfig::default());
        for name in ["first", "second", "third"] {
            assert!(queue.enqueue(quick(name)).await);
        }

        assert_eq!(
            queue.dequeue(Duration::from_millis(10)).await.unwrap().name,
            "first"
        );
        assert_eq!(
            queue.dequeue(Duration::from_millis(10)).await.unwrap().name,
            "second"
        );
        assert_eq!(
            queue.dequeue(Duration::from_millis(10)).await.unwrap().name,
            "third"
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let queue = TaskQueue::new(QueueConfig::default());
        let task = quick("original");
        let mut dup = quick("duplicate");
        dup.id = task.id;

        assert!(queue.enqueue(task).await);
        assert!(!queue.enqueue(dup).await);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_per_level() {
        let queue = TaskQueue::new(QueueConfig {
            capacity_per_priority: 2,
            ..QueueConfig::default()
        });

        assert!(queue.enqueue(quick("a")).await);
        assert!(queue.enqueue(quick("b")).await);
        assert!(!queue.enqueue(quick("c")).await);
        // Other levels are unaffected
        assert!(queue.enqueue(quick("d").with_priority(TaskPriority::High)).await);
    }

    #[tokio::test]
    async fn test_unready_task_is_skipped_not_blocking() {
        let queue = TaskQueue::new(QueueConfig::default());

        // Higher-priority task scheduled far in the future
        assert!(
            queue
                .enqueue(
                    quick("future")
                        .with_priority(TaskPriority::Critical)
                        .run_after(Duration::from_secs(3600))
                )
                .await
        );
        assert!(queue.enqueue(quick("ready").with_priority(TaskPriority::Low)).await);

        let task = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(task.name, "ready");

        // The future task stays queued
        assert_eq!(queue.len().await, 1);
        assert!(queue.dequeue(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn test_scheduled_task_becomes_ready() {
        let queue = TaskQueue::new(QueueConfig {
            poll_interval_ms: 10,
            ..QueueConfig::default()
        });

        assert!(
            queue
                .enqueue(quick("soon").run_after(Duration::from_millis(50)))
                .await
        );

        assert!(queue.dequeue(Duration::from_millis(10)).await.is_none());
        let task = queue.dequeue(Duration::from_millis(500)).await;
        assert_eq!(task.unwrap().name, "soon");
    }

    #[tokio::test]
    async fn test_dequeue_times_out_on_empty_queue() {
        let queue = TaskQueue::new(QueueConfig::default());
        let start = Instant::now();
        assert!(queue.dequeue(Duration::from_millis(50)).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_cancel_queued_task() {
        let queue = TaskQueue::new(QueueConfig::default());
        let task = quick("victim");
        let id = task.id;
        assert!(queue.enqueue(task).await);

        let cancelled = queue.cancel(id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(queue.is_empty().await);

        // Second cancel is a no-op
        assert!(queue.cancel(id).await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(TaskQueue::new(QueueConfig::default()));
        let waiter = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.enqueue(quick("wakeup")).await);

        let task = waiter.await.unwrap().unwrap();
        assert_eq!(task.name, "wakeup");
    }

    proptest! {
        #[test]
        fn prop_dequeue_never_returns_lower_priority_before_higher(
            priorities in proptest::collection::vec(0u8..4, 1..32)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            rt.block_on(async {
                let queue = TaskQueue::new(QueueConfig::default());
                for p in &priorities {
                    let priority = TaskPriority::ALL[*p as usize];
                    prop_assert!(queue.enqueue(quick("t").with_priority(priority)).await);
                }

                let mut drained = Vec::new();
                while let Some(task) = queue.dequeue(Duration::from_millis(1)).await {
                    drained.push(task.priority);
                }

                prop_assert_eq!(drained.len(), priorities.len());
                for pair in drained.windows(2) {
                    prop_assert!(pair[0] <= pair[1]);
                }
                Ok(())
            })?;
        }
    }
}
