//! # Read/Write Lock
//!
//! Reader/writer counts guarded by one internal state lock with two wait
//! conditions. Readers block while a writer holds the lock; writers block
//! while any reader or writer does. Releasing the last reader wakes one
//! waiting writer; releasing a writer wakes every waiter. Writers get no
//! starvation protection beyond FIFO-ish wakeup ordering, which is not
//! strictly guaranteed.

use tokio::sync::{Mutex, Notify};
use tracing::debug;

#[derive(Debug, Default)]
struct RwState {
    readers: u32,
    writers: u32,
}

/// Shared/exclusive lock with explicit acquire/release pairs.
#[derive(Default)]
pub struct ReadWriteLock {
    state: Mutex<RwState>,
    read_ready: Notify,
    write_ready: Notify,
}

impl ReadWriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire shared access; blocks while a writer holds the lock
    pub async fn acquire_read(&self) {
        loop {
            // Register with the Notify before checking state; a notification
            // arriving between the check and the await is stored, not lost.
            let mut waiter = std::pin::pin!(self.read_ready.notified());
            waiter.as_mut().enable();
            {
                let mut state = self.state.lock().await;
                if state.writers == 0 {
                    state.readers += 1;
                    return;
                }
            }
            waiter.await;
        }
    }

    /// Acquire exclusive access; blocks while any reader or writer holds it
    pub async fn acquire_write(&self) {
        loop {
            let mut waiter = std::pin::pin!(self.write_ready.notified());
            waiter.as_mut().enable();
            {
                let mut state = self.state.lock().await;
                if state.readers == 0 && state.writers == 0 {
                    state.writers = 1;
                    return;
                }
            }
            waiter.await;
        }
    }

    /// Release shared access; the last reader out wakes one waiting writer
    pub async fn release_read(&self) {
        let mut state = self.state.lock().await;
        debug_assert!(state.readers > 0, "release_read without a read hold");
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            drop(state);
            self.write_ready.notify_one();
        }
    }

    /// Release exclusive access, waking all waiters (writers and readers
    /// alike race for the next hold)
    pub async fn release_write(&self) {
        let mut state = self.state.lock().await;
        debug_assert!(state.writers > 0, "release_write without a write hold");
        state.writers = 0;
        drop(state);

        debug!("Writer released, waking all waiters");
        self.write_ready.notify_waiters();
        self.read_ready.notify_waiters();
    }

    /// Current (readers, writers) counts, for diagnostics
    pub async fn holders(&self) -> (u32, u32) {
        let state = self.state.lock().await;
        (state.readers, state.writers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_concurrent_readers() {
        let lock = ReadWriteLock::new();
        lock.acquire_read().await;
        lock.acquire_read().await;
        lock.acquire_read().await;
        assert_eq!(lock.holders().await, (3, 0));

        lock.release_read().await;
        lock.release_read().await;
        lock.release_read().await;
        assert_eq!(lock.holders().await, (0, 0));
    }

    #[tokio::test]
    async fn test_writer_blocks_while_reader_holds() {
        let lock = Arc::new(ReadWriteLock::new());
        lock.acquire_read().await;

        let blocked = timeout(Duration::from_millis(50), lock.acquire_write()).await;
        assert!(blocked.is_err(), "writer must block while a reader holds");

        lock.release_read().await;
        timeout(Duration::from_millis(200), lock.acquire_write())
            .await
            .expect("writer acquires after last reader releases");
        lock.release_write().await;
    }

    #[tokio::test]
    async fn test_readers_and_writers_block_while_writer_holds() {
        let lock = Arc::new(ReadWriteLock::new());
        lock.acquire_write().await;

        assert!(timeout(Duration::from_millis(50), lock.acquire_read())
            .await
            .is_err());
        assert!(timeout(Duration::from_millis(50), lock.acquire_write())
            .await
            .is_err());

        lock.release_write().await;
        timeout(Duration::from_millis(200), lock.acquire_read())
            .await
            .expect("reader acquires after writer releases");
        lock.release_read().await;
    }

    #[tokio::test]
    async fn test_last_reader_out_wakes_waiting_writer() {
        let lock = Arc::new(ReadWriteLock::new());
        lock.acquire_read().await;
        lock.acquire_read().await;

        let writer = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.acquire_write().await;
                lock.release_write().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        lock.release_read().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished(), "writer must wait for the last reader");

        lock.release_read().await;
        timeout(Duration::from_millis(500), writer)
            .await
            .expect("writer wakes once readers drain")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mixed_contention_never_wedges() {
        let lock = Arc::new(ReadWriteLock::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    lock.acquire_write().await;
                    lock.release_write().await;
                }
            }));
        }
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    lock.acquire_read().await;
                    lock.release_read().await;
                }
            }));
        }

        // Every acquire must eventually observe a release notification;
        // a parked waiter that misses one wedges this permanently.
        for handle in handles {
            timeout(Duration::from_secs(10), handle)
                .await
                .expect("lock wedged under mixed contention")
                .unwrap();
        }
        assert_eq!(lock.holders().await, (0, 0));
    }

    #[tokio::test]
    async fn test_writer_release_wakes_pending_readers() {
        let lock = Arc::new(ReadWriteLock::new());
        lock.acquire_write().await;

        let mut readers = Vec::new();
        for _ in 0..3 {
            let lock = Arc::clone(&lock);
            readers.push(tokio::spawn(async move {
                lock.acquire_read().await;
                lock.release_read().await;
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        lock.release_write().await;

        for reader in readers {
            timeout(Duration::from_millis(500), reader)
                .await
                .expect("reader wakes after writer release")
                .unwrap();
        }
    }
}
