//! # TaskForge
//!
//! Concurrent task execution and resource coordination primitives for
//! tokio applications:
//!
//! - **Queue**: strict-priority task queue with FIFO ordering within a
//!   level and deferred-readiness scheduling
//! - **Execution**: fixed worker pool draining the queue, with panic
//!   isolation, per-task timeouts, and fixed-delay retry
//! - **Pool**: generic resource pool with factory/validator/destructor
//!   callbacks and background idle/health maintenance
//! - **Locking**: named exclusion locks over a pluggable coordination
//!   store, plus an explicit reader/writer lock
//! - **Resilience**: circuit breakers, exponential retry, and fallback
//!   composition for unreliable collaborators
//!
//! The pieces are independent. Use the queue without the workers, guard a
//! pool checkout with a breaker, or wire everything together from one
//! [`config::TaskForgeConfig`].
//!
//! ## Quick start
//!
//! ```no_run
//! use taskforge::execution::TaskManager;
//! use taskforge::queue::{Task, TaskPriority};
//!
//! # async fn example() -> taskforge::Result<()> {
//! let manager = TaskManager::with_defaults();
//! manager.start();
//!
//! let task = Task::new("sync-orders", || async {
//!     Ok(serde_json::json!({"synced": 42}))
//! })
//! .with_priority(TaskPriority::High);
//!
//! let id = manager.submit_task(task).await?;
//! let status = manager.get_status(id);
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod locking;
pub mod logging;
pub mod pool;
pub mod queue;
pub mod resilience;

pub use config::TaskForgeConfig;
pub use error::{Result, TaskForgeError};
pub use execution::{ExecutionConfig, ManagerStats, TaskManager};
pub use locking::{ExclusionLock, InProcessLockStore, LockStore, ReadWriteLock};
pub use pool::{PoolConfig, PoolError, ResourceHandle, ResourcePool};
pub use queue::{QueueConfig, Task, TaskPriority, TaskQueue, TaskResult, TaskStatus};
pub use resilience::{CircuitBreaker, CircuitBreakerRegistry, RetryPolicy};
