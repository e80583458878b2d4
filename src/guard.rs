//! Per-session mutual exclusion with bounded waiters
//!
//! Wraps a `tokio::sync::Mutex` with two limits: how many callers may queue
//! and how long each may wait. Both failures are reported as lock errors so
//! callers can tell them apart from transport failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::warn;

use crate::errors::{MirrorError, MirrorResult};

#[derive(Debug)]
pub struct SessionLock<T> {
    inner: Mutex<T>,
    waiting: AtomicUsize,
    max_waiting: usize,
    timeout: Duration,
}

/// Counts one queued caller for as long as it lives
struct WaitTicket<'a>(&'a AtomicUsize);

impl Drop for WaitTicket<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> SessionLock<T> {
    pub fn new(value: T, max_waiting: usize, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(value),
            waiting: AtomicUsize::new(0),
            max_waiting,
            timeout,
        }
    }

    /// Acquire the lock
    ///
    /// # Errors
    ///
    /// - `LockContention` if `max_waiting` callers are already queued
    /// - `LockTimeout` if the lock is not acquired within the timeout
    pub async fn lock(&self) -> MirrorResult<MutexGuard<'_, T>> {
        if let Ok(guard) = self.inner.try_lock() {
            return Ok(guard);
        }
        let queued = self.waiting.fetch_add(1, Ordering::SeqCst);
        let _ticket = WaitTicket(&self.waiting);
        if queued >= self.max_waiting {
            warn!(queued, max_waiting = self.max_waiting, "too many callers waiting on session lock");
            return Err(MirrorError::LockContention(format!(
                "{queued} callers already waiting"
            )));
        }
        timeout(self.timeout, self.inner.lock()).await.map_err(|_| {
            warn!(timeout_ms = self.timeout.as_millis() as u64, "session lock wait timed out");
            MirrorError::LockTimeout(format!(
                "not acquired within {}ms",
                self.timeout.as_millis()
            ))
        })
    }

    /// Callers currently queued
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}
