//! # Structured Error Handling
//!
//! Crate-level error type covering every failure mode the coordination core
//! can report. Component-specific errors (for example [`crate::pool::PoolError`])
//! convert into [`TaskForgeError`] so callers can handle everything through one
//! `Result` alias when they do not care about the component boundary.

use crate::pool::PoolError;

/// Top-level error for the task execution and resource coordination core.
///
/// Nothing in this crate is fatal to the process: every variant describes a
/// local, recoverable condition reported through return values.
#[derive(Debug, thiserror::Error)]
pub enum TaskForgeError {
    /// The task queue rejected a submission (duplicate id, capacity, shutdown).
    #[error("Task queue rejected submission: {0}")]
    QueueRejected(String),

    /// A task execution operation failed outside the task body itself.
    #[error("Task execution error: {0}")]
    Execution(String),

    /// Resource pool failure (exhaustion, factory error, shutdown).
    #[error("Resource pool error: {0}")]
    Pool(#[from] PoolError),

    /// Lock coordination failure outside normal contention.
    #[error("Lock coordination error: {0}")]
    Lock(String),

    /// Invalid or unparseable configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, TaskForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_convert_into_crate_error() {
        let err: TaskForgeError = PoolError::ShuttingDown.into();
        assert!(matches!(err, TaskForgeError::Pool(_)));
        assert!(err.to_string().contains("Resource pool error"));
    }
}
