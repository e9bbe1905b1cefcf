//! Countdown latch for callers waiting on a known number of tasks

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Blocks waiters until `count_down` has been called `count` times
#[derive(Debug)]
pub struct CompletionLatch {
    remaining: Mutex<usize>,
    zero: Condvar,
}

impl CompletionLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decrement the count; saturates at zero
    pub fn count_down(&self) {
        let mut remaining = self.lock();
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.zero.notify_all();
        }
    }

    pub fn count(&self) -> usize {
        *self.lock()
    }

    /// Block until the count reaches zero
    pub fn wait(&self) {
        let remaining = self.lock();
        let _guard = self
            .zero
            .wait_while(remaining, |remaining| *remaining > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the count reaches zero or `timeout` elapses; true if it reached zero
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.lock();
        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            remaining = self
                .zero
                .wait_timeout(remaining, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
