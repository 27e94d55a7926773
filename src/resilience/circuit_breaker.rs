//! # Circuit Breaker
//!
//! Failure isolation for operations against unreliable collaborators. Three
//! states: Closed (normal operation), Open (failing fast), and HalfOpen
//! (testing recovery with a limited number of probe calls).

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; calls pass through
    Closed,
    /// Failing fast; every call is rejected until the timeout elapses
    Open,
    /// Trial period; limited probe calls test recovery
    HalfOpen,
}

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed state before the circuit opens
    pub failure_threshold: u32,

    /// Time to stay Open before allowing a probe call through
    pub timeout: Duration,

    /// Consecutive probe successes in HalfOpen state that close the circuit
    pub half_open_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            half_open_attempts: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }
        if self.half_open_attempts == 0 {
            return Err("half_open_attempts must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Errors produced by a guarded call
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the wrapped operation was not invoked. Always
    /// recoverable once the open timeout elapses.
    #[error("Circuit '{name}' is open, call rejected")]
    CircuitOpen { name: String },

    /// The operation ran and failed; the failure was recorded
    #[error("Operation failed: {0}")]
    Operation(E),
}

/// Metrics snapshot for one circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Calls rejected without invoking the operation
    pub rejected_count: u64,
    pub consecutive_failures: u32,
    pub failure_rate: f64,
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    /// Probe calls admitted since entering HalfOpen, bounded by
    /// `half_open_attempts`
    half_open_probes: u32,
    opened_at: Option<Instant>,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    rejected_count: u64,
}

/// Name-keyed circuit breaker. All decision state sits behind one short
/// synchronous mutex; the wrapped operation itself runs outside it.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    core: parking_lot::Mutex<BreakerCore>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            circuit = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            half_open_attempts = config.half_open_attempts,
            "🛡️ Circuit breaker created"
        );

        Self {
            name,
            config,
            core: parking_lot::Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                half_open_probes: 0,
                opened_at: None,
                total_calls: 0,
                success_count: 0,
                failure_count: 0,
                rejected_count: 0,
            }),
        }
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. An elapsed open timeout is only observed by the next
    /// call attempt, so this reports Open until a probe goes through.
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Run `operation` under circuit protection.
    ///
    /// Rejected immediately with [`CircuitBreakerError::CircuitOpen`] while
    /// the circuit is open; otherwise the outcome is recorded and drives the
    /// state machine.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow_call() {
            return Err(CircuitBreakerError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitBreakerError::Operation(err))
            }
        }
    }

    /// Gate a call attempt. Open transitions to HalfOpen once the timeout
    /// since opening has elapsed; HalfOpen admits at most
    /// `half_open_attempts` probe calls and rejects the rest.
    fn allow_call(&self) -> bool {
        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if core.half_open_probes < self.config.half_open_attempts {
                    core.half_open_probes += 1;
                    true
                } else {
                    core.rejected_count += 1;
                    false
                }
            }
            CircuitState::Open => {
                let elapsed = core
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed {
                    core.state = CircuitState::HalfOpen;
                    core.half_open_successes = 0;
                    // This attempt consumes the first probe slot
                    core.half_open_probes = 1;
                    info!(circuit = %self.name, "🟡 Circuit half-open, probing recovery");
                    true
                } else {
                    core.rejected_count += 1;
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut core = self.core.lock();
        core.total_calls += 1;
        core.success_count += 1;

        match core.state {
            CircuitState::Closed => {
                core.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                core.half_open_successes += 1;
                if core.half_open_successes >= self.config.half_open_attempts {
                    Self::close(&mut core);
                    info!(circuit = %self.name, "🟢 Circuit closed, collaborator recovered");
                }
            }
            CircuitState::Open => {
                // A probe raced the transition; harmless, just record it
            }
        }
    }

    fn record_failure(&self) {
        let mut core = self.core.lock();
        core.total_calls += 1;
        core.failure_count += 1;

        match core.state {
            CircuitState::Closed => {
                core.consecutive_failures += 1;
                if core.consecutive_failures >= self.config.failure_threshold {
                    Self::open(&mut core);
                    warn!(
                        circuit = %self.name,
                        consecutive_failures = core.consecutive_failures,
                        "🔴 Circuit opened, failing fast"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // One failure during the trial period reopens immediately
                Self::open(&mut core);
                warn!(circuit = %self.name, "🔴 Probe failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }

    fn open(core: &mut BreakerCore) {
        core.state = CircuitState::Open;
        core.opened_at = Some(Instant::now());
        core.half_open_successes = 0;
        core.half_open_probes = 0;
    }

    fn close(core: &mut BreakerCore) {
        core.state = CircuitState::Closed;
        core.consecutive_failures = 0;
        core.half_open_successes = 0;
        core.half_open_probes = 0;
        core.opened_at = None;
    }

    /// Force the circuit open (emergency stop)
    pub fn force_open(&self) {
        warn!(circuit = %self.name, "🚨 Circuit forced open");
        Self::open(&mut self.core.lock());
    }

    /// Force the circuit closed (emergency recovery), resetting counters
    pub fn force_close(&self) {
        warn!(circuit = %self.name, "🚨 Circuit forced closed");
        Self::close(&mut self.core.lock());
    }

    /// Metrics snapshot
    pub fn metrics(&self) -> CircuitMetrics {
        let core = self.core.lock();
        let failure_rate = if core.total_calls > 0 {
            core.failure_count as f64 / core.total_calls as f64
        } else {
            0.0
        };

        CircuitMetrics {
            state: core.state,
            total_calls: core.total_calls,
            success_count: core.success_count,
            failure_count: core.failure_count,
            rejected_count: core.rejected_count,
            consecutive_failures: core.consecutive_failures,
            failure_rate,
        }
    }
}
