//! # Task Queue Module
//!
//! The task model and the strict-priority blocking queue that feeds the
//! worker pool. Ordering guarantees: priority first, FIFO within a priority
//! level, readiness (`scheduled_at`) gating before either.

pub mod priority_queue;
pub mod task;

pub use priority_queue::{QueueConfig, QueueStats, TaskQueue};
pub use task::{Task, TaskBody, TaskFuture, TaskId, TaskOutput, TaskPriority, TaskResult, TaskStatus};
