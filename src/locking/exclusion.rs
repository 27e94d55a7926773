//! # Named Exclusion Lock
//!
//! Mutual exclusion over a [`LockStore`]. Acquisition is an atomic
//! set-if-absent with expiry; blocking acquisition is a bounded
//! poll-and-sleep loop (the store may be a remote coordinator, so there is no
//! condition-variable wake to lean on). An optional auto-renew loop extends
//! the expiry at roughly one third of the TTL so long critical sections do
//! not lose the lock mid-flight.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::LockStore;

/// Exclusion lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lock record time-to-live, in seconds
    pub ttl_seconds: u64,

    /// Whether to run the background renewal loop while the lock is held
    pub auto_renew: bool,

    /// Poll interval for blocking acquisition, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 30,
            auto_renew: false,
            poll_interval_ms: 50,
        }
    }
}

impl LockConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_seconds == 0 {
            return Err("ttl_seconds must be greater than 0".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// A named mutual-exclusion primitive.
///
/// Each instance carries its own random holder token, so two instances for
/// the same name are distinct contenders even within one process. Contention
/// is reported through `false` returns, never through errors.
pub struct ExclusionLock {
    name: String,
    token: Uuid,
    store: Arc<dyn LockStore>,
    config: LockConfig,
    renew_active: Arc<AtomicBool>,
    renew_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ExclusionLock {
    pub fn new(name: impl Into<String>, store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self {
            name: name.into(),
            token: Uuid::new_v4(),
            store,
            config,
            renew_active: Arc::new(AtomicBool::new(false)),
            renew_handle: parking_lot::Mutex::new(None),
        }
    }

    /// Lock name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This instance's holder token
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Attempt to acquire the lock.
    ///
    /// Non-blocking mode makes a single attempt. Blocking mode polls until
    /// `timeout` elapses, sleeping the configured interval between attempts.
    /// Returns `false` on contention; the caller decides whether to retry,
    /// fall back, or abort.
    pub async fn acquire(&self, blocking: bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            if self
                .store
                .try_acquire(&self.name, self.token, self.config.ttl())
                .await
            {
                debug!(lock = %self.name, token = %self.token, "Acquired exclusion lock");
                if self.config.auto_renew {
                    self.start_renewal();
                }
                return true;
            }

            if !blocking || Instant::now() >= deadline {
                debug!(lock = %self.name, "Lock contended, giving up");
                return false;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.config.poll_interval().min(remaining)).await;
        }
    }

    /// Release the lock.
    ///
    /// Compare-and-delete gated on this instance's token: returns `false`
    /// (no-op) when the lock expired and was re-acquired by another holder.
    pub async fn release(&self) -> bool {
        self.stop_renewal();

        let released = self.store.release(&self.name, self.token).await;
        if released {
            debug!(lock = %self.name, token = %self.token, "Released exclusion lock");
        } else {
            warn!(
                lock = %self.name,
                token = %self.token,
                "Release refused: lock not held by this token"
            );
        }
        released
    }

    /// Spawn the renewal loop: compare-and-renew at one third of the TTL.
    /// If a renewal's compare check fails (someone else now holds the lock)
    /// the loop stops silently; the holder must detect that itself if it
    /// matters.
    fn start_renewal(&self) {
        let mut slot = self.renew_handle.lock();
        if slot.is_some() {
            return;
        }

        self.renew_active.store(true, Ordering::Release);

        let store = Arc::clone(&self.store);
        let active = Arc::clone(&self.renew_active);
        let name = self.name.clone();
        let token = self.token;
        let ttl = self.config.ttl();
        let interval = ttl / 3;

        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !active.load(Ordering::Acquire) {
                    break;
                }
                if !store.renew(&name, token, ttl).await {
                    info!(lock = %name, "Renewal compare check failed, stopping renewal loop");
                    active.store(false, Ordering::Release);
                    break;
                }
                debug!(lock = %name, "Lock expiry renewed");
            }
        }));
    }

    fn stop_renewal(&self) {
        self.renew_active.store(false, Ordering::Release);
        if let Some(handle) = self.renew_handle.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ExclusionLock {
    fn drop(&mut self) {
        // The renewal task must not outlive the lock instance
        self.stop_renewal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::store::InProcessLockStore;

    fn shared_store() -> Arc<InProcessLockStore> {
        Arc::new(InProcessLockStore::new())
    }

    #[tokio::test]
    async fn test_mutual_exclusion_between_instances() {
        let store = shared_store();
        let first = ExclusionLock::new("jobs", store.clone(), LockConfig::default());
        let second = ExclusionLock::new("jobs", store.clone(), LockConfig::default());

        assert!(first.acquire(false, Duration::ZERO).await);
        assert!(!second.acquire(false, Duration::ZERO).await);

        assert!(first.release().await);
        assert!(second.acquire(false, Duration::ZERO).await);
        assert!(second.release().await);
    }

    #[tokio::test]
    async fn test_release_by_non_holder_is_false_noop() {
        let store = shared_store();
        let holder = ExclusionLock::new("jobs", store.clone(), LockConfig::default());
        let other = ExclusionLock::new("jobs", store.clone(), LockConfig::default());

        assert!(holder.acquire(false, Duration::ZERO).await);
        assert!(!other.release().await);
        // The holder's record is untouched
        assert_eq!(store.info("jobs").unwrap().token, holder.token());
        assert!(holder.release().await);
    }

    #[tokio::test]
    async fn test_blocking_acquire_waits_for_release() {
        let store = shared_store();
        let config = LockConfig {
            poll_interval_ms: 10,
            ..LockConfig::default()
        };
        let holder = Arc::new(ExclusionLock::new("jobs", store.clone(), config.clone()));
        let contender = ExclusionLock::new("jobs", store.clone(), config);

        assert!(holder.acquire(false, Duration::ZERO).await);

        let releaser = {
            let holder = Arc::clone(&holder);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                holder.release().await
            })
        };

        assert!(contender.acquire(true, Duration::from_secs(2)).await);
        assert!(releaser.await.unwrap());
        assert!(contender.release().await);
    }

    #[tokio::test]
    async fn test_blocking_acquire_times_out_under_contention() {
        let store = shared_store();
        let config = LockConfig {
            poll_interval_ms: 10,
            ..LockConfig::default()
        };
        let holder = ExclusionLock::new("jobs", store.clone(), config.clone());
        let contender = ExclusionLock::new("jobs", store.clone(), config);

        assert!(holder.acquire(false, Duration::ZERO).await);

        let start = Instant::now();
        assert!(!contender.acquire(true, Duration::from_millis(100)).await);
        assert!(start.elapsed() >= Duration::from_millis(100));

        assert!(holder.release().await);
    }

    #[tokio::test]
    async fn test_auto_renew_keeps_lock_alive_past_ttl() {
        let store = shared_store();
        let config = LockConfig {
            ttl_seconds: 1,
            auto_renew: true,
            poll_interval_ms: 10,
        };
        let holder = ExclusionLock::new("jobs", store.clone(), config.clone());
        let contender = ExclusionLock::new("jobs", store.clone(), config);

        assert!(holder.acquire(false, Duration::ZERO).await);

        // Past the original TTL the renewal loop must have extended expiry
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(!contender.acquire(false, Duration::ZERO).await);
        assert_eq!(store.info("jobs").unwrap().token, holder.token());

        assert!(holder.release().await);
    }

    #[tokio::test]
    async fn test_concurrent_contenders_at_most_one_holder() {
        let store = shared_store();
        let mut handles = Vec::new();

        for _ in 0..8 {
            let store: Arc<dyn LockStore> = store.clone();
            handles.push(tokio::spawn(async move {
                let lock = ExclusionLock::new("hot", store, LockConfig::default());
                lock.acquire(false, Duration::ZERO).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one contender may hold the lock");
    }
}
