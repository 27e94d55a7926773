//! # Lock Coordination Store
//!
//! The seam between the lock API and whatever holds lock records. A store
//! must provide four atomic primitives: set-if-absent-with-expiry,
//! compare-and-delete, compare-and-renew, and expiry collection. Any shared
//! key-value service offering those operations is a valid multi-process
//! backend; [`InProcessLockStore`] is the single-process implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Record of a held lock
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// Lock name namespacing the protected resource
    pub name: String,
    /// Holder identity: a random unique token, never inferred from the caller
    pub token: Uuid,
    pub acquired_at: Instant,
    pub expires_at: Instant,
    /// Reentrant acquisitions by the same holder token
    pub reentrant: u32,
}

/// Atomic lock-record operations.
///
/// Every mutation is gated on the stored holder token: a lock record's expiry
/// is never renewed or deleted by any holder other than the one that created
/// it. This is enforced by the compare checks below, not by trust.
///
/// Backends must implement each method as a single atomic compare-then-mutate.
/// A store that cannot (no server-side conditional operation) cannot
/// implement this trait soundly; such backends need a different coordination
/// protocol entirely, for example lease tokens with monotonic version
/// numbers, rather than a weakened version of these semantics.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically store `token` under `name` if no live record exists.
    /// Re-acquisition by the current holder increments the reentrant count
    /// and extends the expiry. Returns `true` on success.
    async fn try_acquire(&self, name: &str, token: Uuid, ttl: Duration) -> bool;

    /// Compare-and-delete: remove the record only if it still belongs to
    /// `token`. A reentrant hold decrements instead of deleting. Returns
    /// `false` when the record is absent or held by someone else.
    async fn release(&self, name: &str, token: Uuid) -> bool;

    /// Compare-and-renew: extend the expiry only if the record still belongs
    /// to `token` and has not expired.
    async fn renew(&self, name: &str, token: Uuid, ttl: Duration) -> bool;

    /// Drop expired records, returning how many were collected
    async fn expire_stale(&self) -> usize;
}

#[derive(Debug)]
struct LockEntry {
    token: Uuid,
    acquired_at: Instant,
    expires_at: Instant,
    reentrant: u32,
}

/// Single-process lock store: one mutex-guarded map, expiry checked lazily
/// on every operation so a crashed holder's record cannot wedge the name
/// forever.
#[derive(Default)]
pub struct InProcessLockStore {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl InProcessLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Introspect a live lock record (test and diagnostic use)
    pub fn info(&self, name: &str) -> Option<LockInfo> {
        let entries = self.entries.lock();
        let entry = entries.get(name)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(LockInfo {
            name: name.to_string(),
            token: entry.token,
            acquired_at: entry.acquired_at,
            expires_at: entry.expires_at,
            reentrant: entry.reentrant,
        })
    }
}

#[async_trait]
impl LockStore for InProcessLockStore {
    async fn try_acquire(&self, name: &str, token: Uuid, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get_mut(name) {
            Some(entry) if entry.expires_at > now => {
                if entry.token == token {
                    entry.reentrant += 1;
                    entry.expires_at = now + ttl;
                    debug!(lock = name, reentrant = entry.reentrant, "Reentrant acquisition");
                    true
                } else {
                    false
                }
            }
            _ => {
                entries.insert(
                    name.to_string(),
                    LockEntry {
                        token,
                        acquired_at: now,
                        expires_at: now + ttl,
                        reentrant: 0,
                    },
                );
                debug!(lock = name, %token, "Lock acquired");
                true
            }
        }
    }

    async fn release(&self, name: &str, token: Uuid) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get_mut(name) {
            Some(entry) if entry.token == token && entry.expires_at > now => {
                if entry.reentrant > 0 {
                    entry.reentrant -= 1;
                } else {
                    entries.remove(name);
                    debug!(lock = name, %token, "Lock released");
                }
                true
            }
            _ => false,
        }
    }

    async fn renew(&self, name: &str, token: Uuid, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get_mut(name) {
            Some(entry) if entry.token == token && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                true
            }
            _ => false,
        }
    }

    async fn expire_stale(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}
