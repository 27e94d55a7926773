//! # Retry Policy
//!
//! Exponential backoff with optional jitter for transient failures. The
//! policy wraps an async operation factory and retries it up to a configured
//! attempt budget, doubling (or otherwise multiplying) the delay between
//! attempts and capping it at a maximum.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential-backoff retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first call
    pub max_attempts: u32,

    /// Delay before the first retry
    pub backoff: Duration,

    /// Multiplier applied to the delay after each failed attempt
    pub backoff_multiplier: f64,

    /// Upper bound on any single delay
    pub max_backoff: Duration,

    /// Randomize each delay by up to ±10% to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }
        if self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-based), after multiplier, cap,
    /// and jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let raw = self.backoff.as_secs_f64() * factor;
        let capped = raw.min(self.max_backoff.as_secs_f64());

        let jittered = if self.jitter {
            capped * rand::thread_rng().gen_range(0.9..=1.1)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent,
    /// sleeping the computed backoff between attempts. The factory is invoked
    /// once per attempt. Returns the last error when every attempt fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation recovered after retries");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(
                        attempt,
                        error = %err,
                        "Attempt budget exhausted, giving up"
                    );
                    return Err(err);
                }
            }
        }
    }
}
