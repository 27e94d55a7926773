//! # Configuration
//!
//! Layered configuration: struct defaults, then an optional `taskforge.toml`
//! file, then `TASKFORGE__*` environment variables (double underscore as the
//! nesting separator, so `TASKFORGE__EXECUTION__WORKER_COUNT=8` overrides
//! `execution.worker_count`). Everything has a working default; an empty
//! environment yields a usable configuration.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, TaskForgeError};
use crate::execution::ExecutionConfig;
use crate::locking::LockConfig;
use crate::pool::PoolConfig;
use crate::queue::QueueConfig;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Circuit breaker settings in file-friendly units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub half_open_attempts: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let config = CircuitBreakerConfig::default();
        Self {
            failure_threshold: config.failure_threshold,
            timeout_seconds: config.timeout.as_secs(),
            half_open_attempts: config.half_open_attempts,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.timeout_seconds),
            half_open_attempts: self.half_open_attempts,
        }
    }
}

/// Retry settings in file-friendly units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff_ms: policy.backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter: self.jitter,
        }
    }
}

/// Root configuration for every component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskForgeConfig {
    pub execution: ExecutionConfig,
    pub queue: QueueConfig,
    pub pool: PoolConfig,
    pub lock: LockConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub retry: RetrySettings,
}

impl TaskForgeConfig {
    /// Load from `taskforge.toml` (if present) layered with `TASKFORGE__*`
    /// environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from("taskforge")
    }

    /// Load from a specific file stem plus the environment layer
    pub fn load_from(file_stem: &str) -> Result<Self> {
        debug!(file_stem, "Loading configuration");

        let config = Config::builder()
            .add_source(File::with_name(file_stem).required(false))
            .add_source(Environment::with_prefix("TASKFORGE").separator("__"))
            .build()
            .map_err(|e| TaskForgeError::Configuration(format!("config load failed: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| TaskForgeError::Configuration(format!("config parse failed: {e}")))?;

        loaded.validate()?;
        info!(
            workers = loaded.execution.worker_count,
            pool_max = loaded.pool.max_size,
            "🔧 Configuration loaded"
        );
        Ok(loaded)
    }

    /// Validate every section, surfacing the first problem found
    pub fn validate(&self) -> Result<()> {
        self.execution
            .validate()
            .map_err(|e| TaskForgeError::Configuration(format!("execution: {e}")))?;
        self.queue
            .validate()
            .map_err(|e| TaskForgeError::Configuration(format!("queue: {e}")))?;
        self.pool
            .validate()
            .map_err(|e| TaskForgeError::Configuration(format!("pool: {e}")))?;
        self.lock
            .validate()
            .map_err(|e| TaskForgeError::Configuration(format!("lock: {e}")))?;
        self.circuit_breaker
            .to_config()
            .validate()
            .map_err(|e| TaskForgeError::Configuration(format!("circuit_breaker: {e}")))?;
        self.retry
            .to_policy()
            .validate()
            .map_err(|e| TaskForgeError::Configuration(format!("retry: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TaskForgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.worker_count, 4);
        assert_eq!(config.pool.max_size, 10);
    }

    #[test]
    fn test_settings_convert_to_runtime_types() {
        let settings = CircuitBreakerSettings {
            failure_threshold: 2,
            timeout_seconds: 7,
            half_open_attempts: 3,
        };
        let config = settings.to_config();
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.timeout, Duration::from_secs(7));

        let retry = RetrySettings {
            backoff_ms: 250,
            ..Default::default()
        };
        assert_eq!(retry.to_policy().backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_validation_rejects_bad_sections() {
        let mut config = TaskForgeConfig::default();
        config.retry.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry"));
    }
}
