//! Aggregate scheduler counters
//!
//! Tracks, across all tasks:
//! - Submissions per priority
//! - Tasks currently delayed, queued, and running
//! - Completions, failures, and accumulated queue wait
//!
//! Counters are lock-free so workers never contend on them; a snapshot is a
//! best-effort view and may be mid-update relative to other counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::domain::Priority;

/// Live counters updated by the scheduler (thread-safe)
#[derive(Debug)]
pub struct SchedulerMetrics {
    submitted: AtomicU64,
    high_priority: AtomicU64,
    medium_priority: AtomicU64,
    low_priority: AtomicU64,
    delayed: AtomicU64,
    queued: AtomicU64,
    running: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    total_wait_ns: AtomicU64,
    started_at: Instant,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            high_priority: AtomicU64::new(0),
            medium_priority: AtomicU64::new(0),
            low_priority: AtomicU64::new(0),
            delayed: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            running: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_wait_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    fn priority_counter(&self, priority: Priority) -> &AtomicU64 {
        match priority {
            Priority::High => &self.high_priority,
            Priority::Medium => &self.medium_priority,
            Priority::Low => &self.low_priority,
        }
    }

    /// Record an accepted task entering the delay store or the ready queue
    pub(crate) fn record_submitted(&self, priority: Priority, delayed: bool) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.priority_counter(priority).fetch_add(1, Ordering::Relaxed);
        if delayed {
            self.delayed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.queued.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Undo `record_submitted` for a task the queues refused
    pub(crate) fn record_rejected(&self, priority: Priority, delayed: bool) {
        self.submitted.fetch_sub(1, Ordering::Relaxed);
        self.priority_counter(priority).fetch_sub(1, Ordering::Relaxed);
        if delayed {
            self.delayed.fetch_sub(1, Ordering::Relaxed);
        } else {
            self.queued.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// A delayed task moved into the ready queue
    pub(crate) fn record_promoted(&self) {
        self.delayed.fetch_sub(1, Ordering::Relaxed);
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker dequeued a task after it waited `wait`
    pub(crate) fn record_started(&self, wait: Duration) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.running.fetch_add(1, Ordering::Relaxed);
        self.total_wait_ns
            .fetch_add(u64::try_from(wait.as_nanos()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// A task's action returned or panicked
    pub(crate) fn record_finished(&self, success: bool) {
        self.running.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let total_wait_ns = self.total_wait_ns.load(Ordering::Relaxed);
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;

        let average_wait_ms = if completed > 0 {
            (total_wait_ns as f64 / 1_000_000.0) / completed as f64
        } else {
            0.0
        };
        let throughput_per_sec = if elapsed_ms > 0 {
            (completed as f64 * 1000.0) / elapsed_ms as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            high_priority: self.high_priority.load(Ordering::Relaxed),
            medium_priority: self.medium_priority.load(Ordering::Relaxed),
            low_priority: self.low_priority.load(Ordering::Relaxed),
            delayed: self.delayed.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            total_wait_ns,
            average_wait_ms,
            elapsed_ms,
            throughput_per_sec,
        }
    }
}

/// Serializable view of [`SchedulerMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Tasks accepted by `submit`
    pub submitted: u64,
    pub high_priority: u64,
    pub medium_priority: u64,
    pub low_priority: u64,
    /// Tasks waiting for their delay to elapse
    pub delayed: u64,
    /// Tasks eligible and waiting for a worker
    pub queued: u64,
    /// Tasks whose action is executing
    pub running: u64,
    /// Tasks whose action has returned, successfully or not
    pub completed: u64,
    /// Completed tasks that returned an error or panicked
    pub failed: u64,
    /// Sum of queue waits over started tasks
    pub total_wait_ns: u64,
    pub average_wait_ms: f64,
    /// Time since the scheduler was created
    pub elapsed_ms: u64,
    pub throughput_per_sec: f64,
}

impl MetricsSnapshot {
    /// Tasks accepted but not yet finished
    pub fn pending(&self) -> u64 {
        self.delayed + self.queued + self.running
    }
}
