//! # Generic Resource Pool
//!
//! Manages a bounded set of expensive-to-create objects through a
//! caller-supplied factory, validator, and destructor. Two background loops
//! run independently of callers: a reaper that evicts idle/aged resources and
//! tops the pool back up to its minimum, and a prober that re-validates idle
//! resources and marks failures for the reaper.
//!
//! All tracking state lives behind one coarse mutex; this bounds throughput
//! under heavy contention but keeps the lifecycle transitions easy to audit.

use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::resource::{
    PoolConfig, PoolError, PoolStats, PooledResource, ResourceDestructor, ResourceFactory,
    ResourceHandle, ResourceState, ResourceValidator,
};

struct PoolInner<R> {
    resources: HashMap<Uuid, PooledResource<R>>,
    /// Ready queue of idle resource ids, FIFO
    idle: VecDeque<Uuid>,
    /// In-flight factory calls, counted against capacity
    creating: usize,
    shutting_down: bool,
    total_created: u64,
    total_destroyed: u64,
}

enum AcquirePlan<R> {
    Take(Uuid, Arc<R>),
    Create,
    Wait,
}

/// Bounded pool of reusable resources with background health maintenance.
pub struct ResourcePool<R> {
    inner: Mutex<PoolInner<R>>,
    available: Notify,
    config: PoolConfig,
    factory: ResourceFactory<R>,
    validator: ResourceValidator<R>,
    destructor: ResourceDestructor<R>,
    maintenance_running: AtomicBool,
    maintenance: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl<R: Send + Sync + 'static> ResourcePool<R> {
    /// Create a pool, eagerly filling it to `min_size` and starting the
    /// reaper and prober loops.
    pub async fn new(
        config: PoolConfig,
        factory: impl Fn() -> BoxFuture<'static, Result<R, PoolError>> + Send + Sync + 'static,
        validator: impl Fn(Arc<R>) -> BoxFuture<'static, bool> + Send + Sync + 'static,
        destructor: impl Fn(Arc<R>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    ) -> Result<Arc<Self>, PoolError> {
        config.validate()?;

        let pool = Arc::new(Self {
            inner: Mutex::new(PoolInner {
                resources: HashMap::new(),
                idle: VecDeque::new(),
                creating: 0,
                shutting_down: false,
                total_created: 0,
                total_destroyed: 0,
            }),
            available: Notify::new(),
            config,
            factory: Arc::new(factory),
            validator: Arc::new(validator),
            destructor: Arc::new(destructor),
            maintenance_running: AtomicBool::new(true),
            maintenance: parking_lot::Mutex::new(Vec::new()),
        });

        for _ in 0..pool.config.min_size {
            pool.create_idle().await?;
        }

        pool.spawn_maintenance();

        info!(
            min_size = pool.config.min_size,
            max_size = pool.config.max_size,
            "Resource pool initialized"
        );

        Ok(pool)
    }

    /// Check out a resource, blocking up to `timeout` when the pool is at
    /// capacity with nothing idle.
    ///
    /// Never returns an invalid resource: everything taken from the ready
    /// queue is re-validated first, and validation failures are destroyed and
    /// replaced by another acquisition attempt.
    pub async fn acquire(&self, timeout: Duration) -> Result<ResourceHandle<R>, PoolError> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.available.notified();

            let plan = {
                let mut inner = self.inner.lock().await;
                if inner.shutting_down {
                    return Err(PoolError::ShuttingDown);
                }

                match inner.idle.pop_front() {
                    Some(id) => match inner.resources.get_mut(&id) {
                        Some(resource) => {
                            resource.state = ResourceState::InUse;
                            resource.last_used_at = Instant::now();
                            resource.use_count += 1;
                            AcquirePlan::Take(id, Arc::clone(&resource.value))
                        }
                        // Stale id left behind by shutdown/reap; rescan.
                        None => continue,
                    },
                    None if inner.resources.len() + inner.creating < self.config.max_size => {
                        inner.creating += 1;
                        AcquirePlan::Create
                    }
                    None => AcquirePlan::Wait,
                }
            };

            match plan {
                AcquirePlan::Take(id, value) => {
                    if (self.validator)(Arc::clone(&value)).await {
                        debug!(resource_id = %id, "Resource checked out");
                        return Ok(ResourceHandle { id, value });
                    }

                    warn!(resource_id = %id, "Idle resource failed validation, destroying");
                    self.destroy(id).await;
                    // Retry immediately; destruction freed a capacity slot
                }
                AcquirePlan::Create => {
                    let created = (self.factory)().await;
                    let mut inner = self.inner.lock().await;
                    inner.creating -= 1;

                    match created {
                        Ok(value) => {
                            let mut resource = PooledResource::new(value, ResourceState::InUse);
                            resource.use_count = 1;
                            let id = resource.id;
                            let handle = ResourceHandle {
                                id,
                                value: Arc::clone(&resource.value),
                            };
                            inner.resources.insert(id, resource);
                            inner.total_created += 1;
                            debug!(resource_id = %id, "Created resource on demand");
                            return Ok(handle);
                        }
                        Err(err) => {
                            warn!(error = %err, "Resource factory failed during acquire");
                            return Err(err);
                        }
                    }
                }
                AcquirePlan::Wait => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PoolError::Exhausted {
                            waited_ms: timeout.as_millis() as u64,
                        });
                    }
                    let wait = (deadline - now).min(Duration::from_millis(50));
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Return a checked-out resource. Valid resources go back on the ready
    /// queue; invalid ones are destroyed immediately.
    pub async fn release(&self, handle: ResourceHandle<R>) {
        let valid = (self.validator)(Arc::clone(&handle.value)).await;

        let destroy = {
            let mut inner = self.inner.lock().await;
            let shutting_down = inner.shutting_down;
            let idle_len = inner.idle.len();
            let Some(resource) = inner.resources.get_mut(&handle.id) else {
                // Already destroyed (shutdown raced the release)
                return;
            };

            if valid && !shutting_down && idle_len < self.config.max_size {
                resource.state = ResourceState::Idle;
                resource.last_used_at = Instant::now();
                inner.idle.push_back(handle.id);
                false
            } else {
                if !valid {
                    resource.error_count += 1;
                    warn!(resource_id = %handle.id, "Released resource failed validation");
                }
                true
            }
        };

        if destroy {
            self.destroy(handle.id).await;
        } else {
            debug!(resource_id = %handle.id, "Resource returned to pool");
            self.available.notify_one();
        }
    }

    /// Statistics snapshot
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        let mut idle = 0;
        let mut in_use = 0;
        let mut invalid = 0;
        for resource in inner.resources.values() {
            match resource.state {
                ResourceState::Idle => idle += 1,
                ResourceState::InUse => in_use += 1,
                ResourceState::Invalid => invalid += 1,
                ResourceState::Closed => {}
            }
        }
        PoolStats {
            total: inner.resources.len(),
            idle,
            in_use,
            invalid,
            total_created: inner.total_created,
            total_destroyed: inner.total_destroyed,
        }
    }

    /// Stop maintenance and destroy every tracked resource, including ones
    /// currently checked out. Callers holding a resource past shutdown
    /// receive no special signal; their release becomes a no-op.
    pub async fn shutdown(&self) {
        self.maintenance_running.store(false, Ordering::Release);
        for handle in self.maintenance.lock().drain(..) {
            handle.abort();
        }

        let victims: Vec<(Uuid, Arc<R>)> = {
            let mut inner = self.inner.lock().await;
            inner.shutting_down = true;
            inner.idle.clear();
            let victims = inner
                .resources
                .drain()
                .map(|(id, resource)| (id, resource.value))
                .collect::<Vec<_>>();
            inner.total_destroyed += victims.len() as u64;
            victims
        };

        let count = victims.len();
        for (id, value) in victims {
            debug!(resource_id = %id, "Destroying resource on shutdown");
            (self.destructor)(value).await;
        }

        // Wake blocked acquirers so they observe the shutdown
        self.available.notify_waiters();
        info!(destroyed = count, "Resource pool shut down");
    }

    /// Create one idle resource (eager fill and reaper top-up)
    async fn create_idle(&self) -> Result<(), PoolError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.shutting_down {
                return Err(PoolError::ShuttingDown);
            }
            inner.creating += 1;
        }

        let created = (self.factory)().await;
        let mut inner = self.inner.lock().await;
        inner.creating -= 1;

        let value = created?;
        let resource = PooledResource::new(value, ResourceState::Idle);
        let id = resource.id;
        inner.idle.push_back(id);
        inner.resources.insert(id, resource);
        inner.total_created += 1;
        drop(inner);

        self.available.notify_one();
        Ok(())
    }

    /// Remove a resource from tracking and run its destructor
    async fn destroy(&self, id: Uuid) {
        let value = {
            let mut inner = self.inner.lock().await;
            inner.idle.retain(|queued| *queued != id);
            match inner.resources.remove(&id) {
                Some(resource) => {
                    inner.total_destroyed += 1;
                    resource.value
                }
                None => return,
            }
        };

        (self.destructor)(value).await;
    }

    fn spawn_maintenance(self: &Arc<Self>) {
        let mut handles = self.maintenance.lock();

        let reaper = Arc::downgrade(self);
        let reap_interval = self.config.reap_interval();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(reap_interval).await;
                let Some(pool) = Weak::upgrade(&reaper) else {
                    break;
                };
                if !pool.maintenance_running.load(Ordering::Acquire) {
                    break;
                }
                pool.reap_pass().await;
            }
        }));

        let prober = Arc::downgrade(self);
        let probe_interval = self.config.probe_interval();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(probe_interval).await;
                let Some(pool) = Weak::upgrade(&prober) else {
                    break;
                };
                if !pool.maintenance_running.load(Ordering::Acquire) {
                    break;
                }
                pool.probe_pass().await;
            }
        }));
    }

    /// Reaper: destroy idle resources past `max_idle` or `max_age`, collect
    /// invalidated ones, then top back up to `min_size`. In-use resources are
    /// never yanked; an aged-out one is reclaimed when released.
    pub(crate) async fn reap_pass(&self) {
        let now = Instant::now();

        let victims: Vec<Uuid> = {
            let inner = self.inner.lock().await;
            if inner.shutting_down {
                return;
            }
            inner
                .resources
                .values()
                .filter(|resource| match resource.state {
                    ResourceState::Invalid => true,
                    ResourceState::Idle => {
                        resource.idle_for(now) > self.config.max_idle()
                            || resource.age(now) > self.config.max_age()
                    }
                    _ => false,
                })
                .map(|resource| resource.id)
                .collect()
        };

        for id in &victims {
            debug!(resource_id = %id, "Reaping resource");
            self.destroy(*id).await;
        }

        if !victims.is_empty() {
            debug!(reaped = victims.len(), "Reaper pass complete");
        }

        // Top back up to min_size
        loop {
            {
                let inner = self.inner.lock().await;
                if inner.shutting_down
                    || inner.resources.len() + inner.creating >= self.config.min_size
                {
                    break;
                }
            }
            if let Err(err) = self.create_idle().await {
                warn!(error = %err, "Top-up creation failed");
                break;
            }
        }
    }

    /// Prober: re-validate idle resources; failures leave the ready queue and
    /// become Invalid for the reaper's next pass.
    pub(crate) async fn probe_pass(&self) {
        let candidates: Vec<(Uuid, Arc<R>)> = {
            let inner = self.inner.lock().await;
            if inner.shutting_down {
                return;
            }
            inner
                .resources
                .values()
                .filter(|resource| resource.state == ResourceState::Idle)
                .map(|resource| (resource.id, Arc::clone(&resource.value)))
                .collect()
        };

        for (id, value) in candidates {
            if (self.validator)(value).await {
                continue;
            }

            let mut inner = self.inner.lock().await;
            if let Some(resource) = inner.resources.get_mut(&id) {
                // Only demote if the prober still sees it idle; a caller may
                // have checked it out between the snapshot and now.
                if resource.state == ResourceState::Idle {
                    resource.state = ResourceState::Invalid;
                    resource.error_count += 1;
                    inner.idle.retain(|queued| *queued != id);
                    warn!(resource_id = %id, "Probe failed, resource marked invalid");
                }
            }
        }
    }
}
