//! # Pooled Resource Bookkeeping
//!
//! State tracked for every resource owned by a [`crate::pool::ResourcePool`]:
//! lifecycle state, timestamps, and usage counters the maintenance loops use
//! for idle/age eviction decisions.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Creates one resource
pub type ResourceFactory<R> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<R, PoolError>> + Send + Sync>;

/// Checks liveness of one resource
pub type ResourceValidator<R> = Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, bool> + Send + Sync>;

/// Releases one resource
pub type ResourceDestructor<R> = Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Lifecycle state of a pooled resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// On the ready queue, available for checkout
    Idle,
    /// Checked out by a caller
    InUse,
    /// Failed validation; awaiting collection by the reaper
    Invalid,
    /// Destroyed
    Closed,
}

/// A caller-supplied object wrapped with pool bookkeeping.
///
/// Owned by the pool for its entire life; callers check it out but never own
/// it. A caller that fails to return a resource leaks it until the idle/age
/// reaper reclaims and invalidates it.
pub struct PooledResource<R> {
    pub id: Uuid,
    pub(crate) value: Arc<R>,
    pub state: ResourceState,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub use_count: u64,
    pub error_count: u32,
}

impl<R> PooledResource<R> {
    pub(crate) fn new(value: R, state: ResourceState) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            value: Arc::new(value),
            state,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            error_count: 0,
        }
    }

    /// Time since the resource was last checked out or returned
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }

    /// Time since creation
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Checked-out view of a pooled resource. Return it with
/// [`crate::pool::ResourcePool::release`]; dropping the handle without
/// releasing leaks the slot until the reaper reclaims it.
pub struct ResourceHandle<R> {
    pub(crate) id: Uuid,
    pub(crate) value: Arc<R>,
}

impl<R> ResourceHandle<R> {
    /// Pool-internal id of the underlying resource
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<R> std::ops::Deref for ResourceHandle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.value
    }
}

impl<R> fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Resource pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Resources created eagerly and maintained by the reaper's top-up pass
    pub min_size: usize,

    /// Hard upper bound on resources (idle + in use + being created)
    pub max_size: usize,

    /// Idle resources older than this are reaped, in seconds
    pub max_idle_seconds: u64,

    /// Resources older than this are reaped once idle, in seconds
    pub max_age_seconds: u64,

    /// Reaper pass interval, in milliseconds
    pub reap_interval_ms: u64,

    /// Prober pass interval, in milliseconds
    pub probe_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            max_idle_seconds: 300,
            max_age_seconds: 3_600,
            reap_interval_ms: 1_000,
            probe_interval_ms: 5_000,
        }
    }
}

impl PoolConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::Configuration(
                "max_size must be greater than 0".to_string(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::Configuration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.reap_interval_ms == 0 || self.probe_interval_ms == 0 {
            return Err(PoolError::Configuration(
                "maintenance intervals must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_seconds)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

/// Pool statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    pub invalid: usize,
    pub total_created: u64,
    pub total_destroyed: u64,
}

/// Errors reported by the resource pool. All are local and recoverable;
/// exhaustion in particular clears as soon as a resource is returned.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No free resource and the pool is at capacity
    #[error("Pool exhausted: no resource available within {waited_ms}ms")]
    Exhausted { waited_ms: u64 },

    /// The factory failed to create a resource
    #[error("Resource factory failed: {0}")]
    Factory(String),

    /// The pool is shutting down and no longer serves acquisitions
    #[error("Pool is shutting down")]
    ShuttingDown,

    /// Invalid pool configuration
    #[error("Invalid pool configuration: {0}")]
    Configuration(String),
}
