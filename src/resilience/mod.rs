//! # Resilience Module
//!
//! Failure-isolation primitives for calls into unreliable collaborators:
//! circuit breakers (fail fast while a dependency is down), exponential
//! retry with jitter, and fallback composition. The guards compose by
//! nesting closures, so retry-inside-breaker and breaker-with-fallback are
//! both one-liners at the call site.

pub mod circuit_breaker;
pub mod fallback;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitMetrics, CircuitState,
};
pub use fallback::with_fallback;
pub use registry::{CircuitBreakerRegistry, RegistryMetrics};
pub use retry::RetryPolicy;
