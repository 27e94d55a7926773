//! # Circuit Breaker Registry
//!
//! Name-keyed registry of circuit breakers with lazy creation, per-name
//! configuration overrides, and aggregate health reporting. Safe to share
//! across tasks; lookups are lock-free reads on the hot path.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitMetrics, CircuitState,
};

/// Aggregate view across all registered breakers
#[derive(Debug, Clone, Serialize)]
pub struct RegistryMetrics {
    pub total_breakers: usize,
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    /// Fraction of breakers currently closed; 1.0 when none are registered
    pub health_score: f64,
    pub breakers: HashMap<String, CircuitMetrics>,
}

/// Shared registry of named circuit breakers
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            overrides: HashMap::new(),
        }
    }

    /// Register a per-name configuration used when that breaker is first
    /// created. Has no effect on a breaker that already exists.
    pub fn with_override(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    /// Get the breaker for `name`, creating it on first use
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| self.default_config.clone());
                info!(circuit = name, "Registering circuit breaker");
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone()
    }

    /// Run `operation` under the named breaker
    pub async fn call<F, Fut, T, E>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker(name).call(operation).await
    }

    /// Registered breaker names
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove a breaker, returning whether it existed
    pub fn remove(&self, name: &str) -> bool {
        self.breakers.remove(name).is_some()
    }

    /// Emergency stop: open every registered breaker
    pub fn force_open_all(&self) {
        warn!("🚨 Forcing all circuit breakers open");
        for entry in self.breakers.iter() {
            entry.value().force_open();
        }
    }

    /// Emergency recovery: close every registered breaker
    pub fn force_close_all(&self) {
        warn!("🚨 Forcing all circuit breakers closed");
        for entry in self.breakers.iter() {
            entry.value().force_close();
        }
    }

    /// Aggregate metrics snapshot across all breakers
    pub fn metrics(&self) -> RegistryMetrics {
        let mut breakers = HashMap::new();
        let (mut closed, mut open, mut half_open) = (0usize, 0usize, 0usize);

        for entry in self.breakers.iter() {
            let metrics = entry.value().metrics();
            match metrics.state {
                CircuitState::Closed => closed += 1,
                CircuitState::Open => open += 1,
                CircuitState::HalfOpen => half_open += 1,
            }
            breakers.insert(entry.key().clone(), metrics);
        }

        let total = breakers.len();
        let health_score = if total == 0 {
            1.0
        } else {
            closed as f64 / total as f64
        };

        RegistryMetrics {
            total_breakers: total,
            closed,
            open,
            half_open,
            health_score,
            breakers,
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lazy_creation_returns_same_instance() {
        let registry = CircuitBreakerRegistry::default();
        let first = registry.breaker("payments");
        let second = registry.breaker("payments");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.names(), vec!["payments".to_string()]);
    }

    #[tokio::test]
    async fn test_override_applies_on_first_creation() {
        let registry = CircuitBreakerRegistry::default().with_override(
            "fragile",
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_secs(60),
                half_open_attempts: 1,
            },
        );

        // One failure opens the overridden breaker; the default needs five
        let _ = registry
            .call("fragile", || async { Err::<(), _>("down") })
            .await;
        assert_eq!(registry.breaker("fragile").state(), CircuitState::Open);

        let _ = registry
            .call("sturdy", || async { Err::<(), _>("down") })
            .await;
        assert_eq!(registry.breaker("sturdy").state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_metrics_and_health_score() {
        let registry = CircuitBreakerRegistry::default();
        assert_eq!(registry.metrics().health_score, 1.0);

        registry.breaker("a");
        registry.breaker("b");
        registry.breaker("b").force_open();

        let metrics = registry.metrics();
        assert_eq!(metrics.total_breakers, 2);
        assert_eq!(metrics.closed, 1);
        assert_eq!(metrics.open, 1);
        assert!((metrics.health_score - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_force_all_operations() {
        let registry = CircuitBreakerRegistry::default();
        registry.breaker("a");
        registry.breaker("b");

        registry.force_open_all();
        assert_eq!(registry.metrics().open, 2);

        registry.force_close_all();
        assert_eq!(registry.metrics().closed, 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = CircuitBreakerRegistry::default();
        registry.breaker("gone");
        assert!(registry.remove("gone"));
        assert!(!registry.remove("gone"));
    }
}
