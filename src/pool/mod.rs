//! # Resource Pool Module
//!
//! Generic object pooling with background health maintenance: bounded
//! checkout/return of expensive-to-create resources, validate-on-acquire,
//! and reaper/prober loops that evict stale or unhealthy resources.

pub mod resource;
pub mod resource_pool;

pub use resource::{
    PoolConfig, PoolError, PoolStats, PooledResource, ResourceDestructor, ResourceFactory,
    ResourceHandle, ResourceState, ResourceValidator,
};
pub use resource_pool::ResourcePool;
