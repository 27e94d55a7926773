//! # Task Worker
//!
//! A long-lived execution unit pulling from the shared priority queue. Each
//! worker runs an independent loop: dequeue a ready task, run its body to
//! completion, record the outcome. A failing or panicking task body never
//! terminates the pull loop.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::queue::{Task, TaskResult, TaskStatus};

use super::manager::{ExecutionContext, TaskProgress};

/// One concurrent execution unit owned by the task manager
pub(crate) struct TaskWorker {
    worker_id: usize,
    ctx: Arc<ExecutionContext>,
}

impl TaskWorker {
    pub(crate) fn new(worker_id: usize, ctx: Arc<ExecutionContext>) -> Self {
        Self { worker_id, ctx }
    }

    /// Pull loop: runs until the manager clears the running flag. The dequeue
    /// timeout bounds how long a shutdown request can go unobserved.
    pub(crate) async fn run(self) {
        info!(worker_id = self.worker_id, "Worker started");

        while self.ctx.running.load(Ordering::Acquire) {
            let Some(task) = self.ctx.queue.dequeue(self.ctx.config.dequeue_timeout()).await
            else {
                continue;
            };

            // A dequeued task always runs to completion or failure;
            // cancellation is pre-execution only.
            self.execute(task).await;
        }

        info!(worker_id = self.worker_id, "Worker stopped");
    }

    async fn execute(&self, mut task: Task) {
        task.status = TaskStatus::Running;
        task.attempts += 1;
        self.ctx.progress.insert(
            task.id,
            TaskProgress {
                status: TaskStatus::Running,
                attempts: task.attempts,
            },
        );

        debug!(
            worker_id = self.worker_id,
            task_id = %task.id,
            task_name = %task.name,
            attempt = task.attempts,
            max_retries = task.max_retries,
            "Executing task"
        );

        let started = Instant::now();
        let outcome = self.run_body(&task).await;
        let duration = started.elapsed();

        match outcome {
            Ok(value) => {
                info!(
                    worker_id = self.worker_id,
                    task_id = %task.id,
                    task_name = %task.name,
                    attempts = task.attempts,
                    duration_ms = duration.as_millis() as u64,
                    "🟢 Task succeeded"
                );
                self.ctx.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                self.ctx
                    .record_terminal(TaskResult::success(task.id, value, duration, task.attempts));
            }
            Err(message) => self.handle_failure(task, message, duration).await,
        }
    }

    /// Invoke the body with the optional per-attempt timeout, converting
    /// panics and timeouts into ordinary attempt failures.
    async fn run_body(&self, task: &Task) -> Result<serde_json::Value, String> {
        let attempt = AssertUnwindSafe(task.invoke()).catch_unwind();

        let result = match task.timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => return Err(format!("timed out after {}ms", limit.as_millis())),
            },
            None => attempt.await,
        };

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task body panicked".to_string());
                error!(
                    worker_id = self.worker_id,
                    task_id = %task.id,
                    panic = %message,
                    "Task body panicked"
                );
                Err(format!("panic: {message}"))
            }
        }
    }

    /// Retry with a fixed per-task delay while attempts remain, otherwise
    /// fail permanently. The fixed delay is intentional; exponential backoff
    /// belongs to the resilience layer.
    async fn handle_failure(&self, mut task: Task, message: String, duration: std::time::Duration) {
        if task.attempts < task.max_retries {
            task.status = TaskStatus::Retrying;
            task.scheduled_at = Some(Instant::now() + task.retry_delay);
            self.ctx.progress.insert(
                task.id,
                TaskProgress {
                    status: TaskStatus::Retrying,
                    attempts: task.attempts,
                },
            );
            self.ctx.counters.retried.fetch_add(1, Ordering::Relaxed);

            warn!(
                worker_id = self.worker_id,
                task_id = %task.id,
                task_name = %task.name,
                attempt = task.attempts,
                max_retries = task.max_retries,
                retry_delay_ms = task.retry_delay.as_millis() as u64,
                error = %message,
                "Task failed, will retry"
            );

            let task_id = task.id;
            let attempts = task.attempts;
            if !self.ctx.queue.enqueue(task).await {
                // The queue refused the re-enqueue (capacity); the task fails
                // permanently rather than vanishing.
                error!(task_id = %task_id, "Re-enqueue rejected, failing task");
                self.ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.ctx.record_terminal(TaskResult::failure(
                    task_id,
                    format!("retry re-enqueue rejected after: {message}"),
                    duration,
                    attempts,
                ));
            }
        } else {
            error!(
                worker_id = self.worker_id,
                task_id = %task.id,
                task_name = %task.name,
                attempts = task.attempts,
                error = %message,
                "🔴 Task failed permanently"
            );
            self.ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
            self.ctx
                .record_terminal(TaskResult::failure(task.id, message, duration, task.attempts));
        }
    }
}
