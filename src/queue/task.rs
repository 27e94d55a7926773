//! # Task Model
//!
//! A [`Task`] is one unit of schedulable work: an async closure body captured
//! at submission time, a priority, a retry policy, and an optional readiness
//! instant. Terminal outcomes are recorded as immutable [`TaskResult`]s.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque unique task identity
pub type TaskId = Uuid;

/// Output of a task body: a JSON value on success, an opaque error otherwise.
pub type TaskOutput = std::result::Result<serde_json::Value, anyhow::Error>;

/// Boxed future returned by a task body invocation
pub type TaskFuture = BoxFuture<'static, TaskOutput>;

/// A task body is an async closure invoked once per attempt. Arguments are
/// captured by the closure at submission time.
pub type TaskBody = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Task priority levels. Lower numeric value is served first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl TaskPriority {
    /// Number of distinct priority levels
    pub const LEVELS: usize = 4;

    /// All priorities in dequeue order (highest priority first)
    pub const ALL: [TaskPriority; Self::LEVELS] = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
    ];

    /// Index of this priority into per-level containers
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        };
        write!(f, "{label}")
    }
}

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet submitted
    Pending,
    /// Waiting in the queue
    Queued,
    /// A worker holds the task and is executing its body
    Running,
    /// Terminal: body returned normally
    Success,
    /// Terminal: attempts exhausted or task rejected
    Failed,
    /// Terminal: cancelled before execution
    Cancelled,
    /// Transient: failed with attempts remaining, will re-enter the queue
    Retrying,
}

impl TaskStatus {
    /// Terminal states never transition again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Cancellation is only possible before a worker picks the task up
    pub fn is_cancellable(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Queued)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Retrying => "retrying",
        };
        write!(f, "{label}")
    }
}

/// One unit of schedulable work
pub struct Task {
    /// Unique task identity
    pub id: TaskId,

    /// Human-readable name for logging and status queries
    pub name: String,

    /// Async closure invoked once per attempt
    pub(crate) body: TaskBody,

    /// Priority level; strict priority, FIFO within a level
    pub priority: TaskPriority,

    /// Maximum execution attempts before the task fails permanently.
    /// `0` means a single attempt with no retry.
    pub max_retries: u32,

    /// Fixed delay applied between attempts (not exponential; the resilience
    /// layer's retry wrapper is the exponential one)
    pub retry_delay: Duration,

    /// Optional per-attempt execution timeout
    pub timeout: Option<Duration>,

    /// Not eligible for execution before this instant
    pub scheduled_at: Option<Instant>,

    /// Advisory prerequisite task ids. Tracked and surfaced in status but
    /// never enforced by the scheduler.
    pub dependencies: Vec<TaskId>,

    /// Current lifecycle state
    pub status: TaskStatus,

    /// Execution attempts so far
    pub attempts: u32,

    /// Wall-clock creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a task from an async closure with default policy: normal
    /// priority, three attempts, five second retry delay.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutput> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            body: Arc::new(move || Box::pin(body())),
            priority: TaskPriority::Normal,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            timeout: None,
            scheduled_at: None,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// Set the priority level
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry policy: maximum attempts and the fixed delay between them
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Set a per-attempt execution timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delay eligibility until `delay` from now
    pub fn run_after(mut self, delay: Duration) -> Self {
        self.scheduled_at = Some(Instant::now() + delay);
        self
    }

    /// Record an advisory dependency on another task
    pub fn with_dependency(mut self, prerequisite: TaskId) -> Self {
        self.dependencies.push(prerequisite);
        self
    }

    /// Whether the task is eligible for execution at `now`
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.scheduled_at {
            Some(at) => at <= now,
            None => true,
        }
    }

    /// Invoke the task body for one attempt
    pub(crate) fn invoke(&self) -> TaskFuture {
        (self.body)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("attempts", &self.attempts)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Immutable record of a task's terminal outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task identity
    pub task_id: TaskId,

    /// Terminal status (Success, Failed, or Cancelled)
    pub status: TaskStatus,

    /// Return value of the final successful attempt, if any
    pub value: Option<serde_json::Value>,

    /// Error description of the final failed attempt, if any
    pub error: Option<String>,

    /// Execution duration of the final attempt
    pub duration: Duration,

    /// Total execution attempts
    pub attempts: u32,

    /// Wall-clock completion timestamp
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Record a successful outcome
    pub fn success(
        task_id: TaskId,
        value: serde_json::Value,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Success,
            value: Some(value),
            error: None,
            duration,
            attempts,
            completed_at: Utc::now(),
        }
    }

    /// Record a permanent failure
    pub fn failure(
        task_id: TaskId,
        error: impl Into<String>,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            value: None,
            error: Some(error.into()),
            duration,
            attempts,
            completed_at: Utc::now(),
        }
    }

    /// Record a pre-execution cancellation
    pub fn cancelled(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Cancelled,
            value: None,
            error: None,
            duration: Duration::ZERO,
            attempts: 0,
            completed_at: Utc::now(),
        }
    }
}
