//! Ready queue: eligible jobs ordered by priority, then submission order

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::{Action, Priority, TaskHandle};

/// A task split into its shared handle and the action a worker consumes
pub(crate) struct Job {
    pub(crate) handle: TaskHandle,
    pub(crate) action: Action,
}

impl Job {
    pub(crate) fn new(handle: TaskHandle, action: Action) -> Self {
        Self { handle, action }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("handle", &self.handle).finish_non_exhaustive()
    }
}

/// Heap entry with the sort keys copied out of the handle
struct ReadyEntry {
    priority: Priority,
    submitted_at: Instant,
    sequence: u64,
    job: Job,
}

impl ReadyEntry {
    fn new(job: Job) -> Self {
        Self {
            priority: job.handle.priority(),
            submitted_at: job.handle.submitted_at(),
            sequence: job.handle.sequence(),
            job,
        }
    }
}

impl Eq for ReadyEntry {}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: lower rank first, then earlier submission
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of a blocking pop
#[derive(Debug)]
pub(crate) enum Pop {
    /// Highest-priority eligible job
    Job(Job),

    /// Nothing arrived before the timeout
    Timeout,

    /// `wake_all` was called while waiting
    Woken,

    /// Closed and empty: no job will ever arrive
    Closed,
}

struct ReadyState {
    heap: BinaryHeap<ReadyEntry>,
    closed: bool,
    wake_epoch: u64,
}

/// Thread-safe priority queue of eligible jobs
pub(crate) struct ReadyQueue {
    state: Mutex<ReadyState>,
    not_empty: Condvar,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ReadyState {
                heap: BinaryHeap::new(),
                closed: false,
                wake_epoch: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReadyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a job; hands it back if the queue is closed
    pub(crate) fn push(&self, job: Job) -> Result<(), Job> {
        let mut state = self.lock();
        if state.closed {
            return Err(job);
        }
        state.heap.push(ReadyEntry::new(job));
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the best job, waiting up to `timeout` for one to arrive
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Pop {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        let epoch = state.wake_epoch;
        loop {
            if let Some(entry) = state.heap.pop() {
                return Pop::Job(entry.job);
            }
            if state.closed {
                return Pop::Closed;
            }
            if state.wake_epoch != epoch {
                return Pop::Woken;
            }
            let now = Instant::now();
            if now >= deadline {
                return Pop::Timeout;
            }
            state = self
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Stop accepting jobs; poppers see `Closed` once the heap drains
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
    }

    /// Make every blocked popper return so it can re-check its exit condition
    pub(crate) fn wake_all(&self) {
        let mut state = self.lock();
        state.wake_epoch = state.wake_epoch.wrapping_add(1);
        drop(state);
        self.not_empty.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn job(priority: Priority) -> (Job, TaskHandle) {
        let (handle, action) = Task::new(|| {}, priority, 0).into_parts();
        (Job::new(handle.clone(), action), handle)
    }

    fn pop_now(queue: &ReadyQueue) -> Option<Job> {
        match queue.pop_timeout(Duration::ZERO) {
            Pop::Job(job) => Some(job),
            _ => None,
        }
    }

    #[test]
    fn test_higher_priority_pops_first() {
        let queue = ReadyQueue::new();
        let (low, low_handle) = job(Priority::Low);
        let (medium, medium_handle) = job(Priority::Medium);
        let (high, high_handle) = job(Priority::High);
        queue.push(low).unwrap();
        queue.push(medium).unwrap();
        queue.push(high).unwrap();

        assert_eq!(pop_now(&queue).unwrap().handle.id(), high_handle.id());
        assert_eq!(pop_now(&queue).unwrap().handle.id(), medium_handle.id());
        assert_eq!(pop_now(&queue).unwrap().handle.id(), low_handle.id());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_same_priority_fifo() {
        let queue = ReadyQueue::new();
        let (first, first_handle) = job(Priority::Medium);
        let (second, second_handle) = job(Priority::Medium);
        // Push out of order; construction order decides
        queue.push(second).unwrap();
        queue.push(first).unwrap();

        assert_eq!(pop_now(&queue).unwrap().handle.id(), first_handle.id());
        assert_eq!(pop_now(&queue).unwrap().handle.id(), second_handle.id());
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let queue = ReadyQueue::new();
        let started = Instant::now();
        assert!(matches!(queue.pop_timeout(Duration::from_millis(30)), Pop::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_closed_queue_rejects_push_and_drains() {
        let queue = ReadyQueue::new();
        let (pending, _) = job(Priority::Low);
        queue.push(pending).unwrap();
        queue.close();

        let (late, _) = job(Priority::High);
        assert!(queue.push(late).is_err());
        assert!(matches!(queue.pop_timeout(Duration::ZERO), Pop::Job(_)));
        assert!(matches!(queue.pop_timeout(Duration::from_secs(5)), Pop::Closed));
    }

    #[test]
    fn test_blocked_pop_receives_push() {
        let queue = Arc::new(ReadyQueue::new());
        let popper = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        let (pushed, handle) = job(Priority::High);
        queue.push(pushed).unwrap();

        match popper.join().unwrap() {
            Pop::Job(job) => assert_eq!(job.handle.id(), handle.id()),
            other => panic!("expected job, got {:?}", other),
        }
    }

    #[test]
    fn test_wake_all_interrupts_blocked_pop() {
        let queue = Arc::new(ReadyQueue::new());
        let popper = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let started = Instant::now();
                (queue.pop_timeout(Duration::from_secs(10)), started.elapsed())
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.wake_all();

        let (result, elapsed) = popper.join().unwrap();
        assert!(matches!(result, Pop::Woken));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_len_tracks_pushes() {
        let queue = ReadyQueue::new();
        assert_eq!(queue.len(), 0);
        queue.push(job(Priority::Low).0).unwrap();
        queue.push(job(Priority::High).0).unwrap();
        assert_eq!(queue.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_pop_order_respects_priority_then_fifo(ranks in proptest::collection::vec(0usize..3, 1..40)) {
            let queue = ReadyQueue::new();
            let mut expected = Vec::new();
            for rank in ranks {
                let (pushed, handle) = job(Priority::ALL[rank]);
                expected.push((handle.priority(), handle.sequence()));
                queue.push(pushed).unwrap();
            }
            expected.sort();

            let mut popped = Vec::new();
            while let Some(job) = pop_now(&queue) {
                popped.push((job.handle.priority(), job.handle.sequence()));
            }
            prop_assert_eq!(popped, expected);
        }
    }
}
