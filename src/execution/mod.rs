//! # Execution Module
//!
//! The worker pool and its manager: a fixed set of long-lived pull loops
//! against the shared priority queue, fixed-delay retry on task failure, and
//! a completed-task map for status queries by id.

pub mod manager;
pub(crate) mod worker;

pub use manager::{ExecutionConfig, ManagerStats, TaskManager, TaskStatusReport};
