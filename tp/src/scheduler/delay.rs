//! Delay store and the dispatcher thread that promotes expired holders

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace};

use crate::domain::TaskOutcome;

use super::core::Shared;
use super::queue::Job;

/// A job waiting for its trigger instant
pub(crate) struct DelayHolder {
    trigger_at: Instant,
    sequence: u64,
    job: Job,
}

impl DelayHolder {
    /// Wrap a job, triggering `delay` from now
    pub(crate) fn new(job: Job) -> Self {
        Self {
            trigger_at: Instant::now() + job.handle.delay(),
            sequence: job.handle.sequence(),
            job,
        }
    }

    pub(crate) fn trigger_at(&self) -> Instant {
        self.trigger_at
    }
}

impl std::fmt::Debug for DelayHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayHolder")
            .field("trigger_at", &self.trigger_at)
            .field("job", &self.job)
            .finish()
    }
}

impl Eq for DelayHolder {}

impl PartialEq for DelayHolder {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for DelayHolder {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest trigger on top of the max-heap
        other
            .trigger_at
            .cmp(&self.trigger_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for DelayHolder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of waiting on the delay store
#[derive(Debug)]
pub(crate) enum DelayPop {
    /// A holder's trigger instant has passed
    Expired(Job),

    /// Nothing expired within the wait bound
    Timeout,

    /// Closed and empty
    Drained,
}

struct DelayState {
    heap: BinaryHeap<DelayHolder>,
    closed: bool,
}

/// Min-heap of delayed jobs keyed by trigger instant
///
/// Safe for many producers and a single consumer.
pub(crate) struct DelayStore {
    state: Mutex<DelayState>,
    changed: Condvar,
}

impl DelayStore {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(DelayState {
                heap: BinaryHeap::new(),
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a holder; hands it back once the store is closed
    pub(crate) fn push(&self, holder: DelayHolder) -> Result<(), DelayHolder> {
        let mut state = self.lock();
        if state.closed {
            return Err(holder);
        }
        state.heap.push(holder);
        drop(state);
        // The new holder may trigger before the one the consumer is sleeping on
        self.changed.notify_all();
        Ok(())
    }

    /// Wait up to `max_wait` for the earliest holder to expire
    pub(crate) fn pop_expired(&self, max_wait: Duration) -> DelayPop {
        let deadline = Instant::now() + max_wait;
        let mut state = self.lock();
        loop {
            let now = Instant::now();
            let next_trigger = state.heap.peek().map(DelayHolder::trigger_at);
            let wake_at = match next_trigger {
                Some(trigger_at) if trigger_at <= now => {
                    if let Some(holder) = state.heap.pop() {
                        return DelayPop::Expired(holder.job);
                    }
                    deadline
                }
                Some(trigger_at) => trigger_at.min(deadline),
                None if state.closed => return DelayPop::Drained,
                None => deadline,
            };
            if now >= deadline {
                return DelayPop::Timeout;
            }
            state = self
                .changed
                .wait_timeout(state, wake_at - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Reject new holders and wake the consumer; pending holders still expire
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().heap.len()
    }
}

/// Single background thread moving expired holders into the ready queue
pub(crate) struct DelayDispatcher {
    shared: Arc<Shared>,
}

impl DelayDispatcher {
    /// Start the dispatcher thread
    pub(crate) fn spawn(shared: Arc<Shared>) -> std::io::Result<JoinHandle<()>> {
        debug!("DelayDispatcher::spawn: called");
        thread::Builder::new()
            .name("taskpool-delay-dispatcher".to_string())
            .spawn(move || Self { shared }.run())
    }

    fn run(self) {
        info!("Delay dispatcher started");
        loop {
            match self.shared.delayed.pop_expired(self.shared.poll_interval) {
                DelayPop::Expired(job) => self.promote(job),
                DelayPop::Timeout => {
                    trace!("DelayDispatcher::run: poll timeout, re-checking");
                }
                DelayPop::Drained => {
                    debug!("DelayDispatcher::run: delay store drained after shutdown");
                    break;
                }
            }
        }
        // No producer is left once submissions stop and delays have drained
        self.shared.ready.close();
        info!("Delay dispatcher stopped");
    }

    fn promote(&self, job: Job) {
        let id = job.handle.id();
        debug!(%id, priority = ?job.handle.priority(), "DelayDispatcher::promote: trigger reached");
        self.shared.metrics.record_promoted();
        if let Err(job) = self.shared.ready.push(job) {
            // Only this thread closes the ready queue, so this indicates a bug
            error!(%id, "Ready queue closed while promoting delayed task, dropping it");
            self.shared.metrics.record_finished(false);
            job.handle
                .mark_finished(Instant::now(), TaskOutcome::Failed("ready queue closed".to_string()));
        }
    }
}
