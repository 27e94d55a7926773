//! # Locking Module
//!
//! Named mutual-exclusion primitives usable locally or across processes via
//! a shared coordination store, plus a reader/writer variant. This is
//! best-effort coordination over atomic compare-then-mutate primitives, not
//! quorum-based consensus.

pub mod exclusion;
pub mod rwlock;
pub mod store;

pub use exclusion::{ExclusionLock, LockConfig};
pub use rwlock::ReadWriteLock;
pub use store::{InProcessLockStore, LockInfo, LockStore};
