//! Scheduler implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{Priority, Task, TaskHandle};
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};

use super::config::SchedulerConfig;
use super::delay::{DelayDispatcher, DelayHolder, DelayStore};
use super::error::SchedulerError;
use super::queue::{Job, ReadyQueue};
use super::worker::WorkerPool;

/// State shared between the scheduler, its workers, and the dispatcher
pub(crate) struct Shared {
    pub(crate) ready: ReadyQueue,
    pub(crate) delayed: DelayStore,
    pub(crate) metrics: SchedulerMetrics,
    pub(crate) poll_interval: Duration,
}

/// Background threads owned by the scheduler
struct Threads {
    workers: WorkerPool,
    dispatcher: JoinHandle<()>,
}

/// The Scheduler dispatches tasks to a fixed worker pool in priority order,
/// holding delayed tasks until their trigger instant.
pub struct Scheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    shutdown: AtomicBool,
    threads: Mutex<Option<Threads>>,
}

impl Scheduler {
    /// Create a scheduler and start its worker and dispatcher threads
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        debug!(?config, "Scheduler::new: called");
        config.validate()?;

        let shared = Arc::new(Shared {
            ready: ReadyQueue::new(),
            delayed: DelayStore::new(),
            metrics: SchedulerMetrics::new(),
            poll_interval: config.poll_interval(),
        });

        let workers = match WorkerPool::spawn(config.worker_count, &shared) {
            Ok(workers) => workers,
            Err(e) => {
                // Release any workers that did start
                shared.ready.close();
                return Err(e.into());
            }
        };
        let dispatcher = match DelayDispatcher::spawn(Arc::clone(&shared)) {
            Ok(handle) => handle,
            Err(e) => {
                shared.ready.close();
                return Err(e.into());
            }
        };

        info!(workers = workers.len(), poll_interval_ms = config.poll_interval_ms, "Scheduler started");
        Ok(Self {
            config,
            shared,
            shutdown: AtomicBool::new(false),
            threads: Mutex::new(Some(Threads { workers, dispatcher })),
        })
    }

    /// Create a scheduler with `worker_count` workers and default settings
    pub fn with_workers(worker_count: usize) -> Result<Self, SchedulerError> {
        Self::new(SchedulerConfig::with_workers(worker_count))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue a task; delayed tasks wait in the delay store first
    pub fn submit_task(&self, task: Task) -> Result<TaskHandle, SchedulerError> {
        debug!(id = %task.id(), priority = ?task.priority(), delay = ?task.delay(), "Scheduler::submit_task: called");
        if self.is_shutdown() {
            debug!(id = %task.id(), "Scheduler::submit_task: shut down, rejecting");
            return Err(SchedulerError::ShutDown);
        }

        let (handle, action) = task.into_parts();
        let priority = handle.priority();
        let delayed = !handle.delay().is_zero();
        let job = Job::new(handle.clone(), action);

        self.shared.metrics.record_submitted(priority, delayed);
        let accepted = if delayed {
            debug!(id = %handle.id(), "Scheduler::submit_task: delayed branch");
            self.shared.delayed.push(DelayHolder::new(job)).is_ok()
        } else {
            debug!(id = %handle.id(), "Scheduler::submit_task: ready branch");
            self.shared.ready.push(job).is_ok()
        };

        if !accepted {
            // Lost a race with shutdown
            debug!(id = %handle.id(), "Scheduler::submit_task: queue closed, rejecting");
            self.shared.metrics.record_rejected(priority, delayed);
            return Err(SchedulerError::ShutDown);
        }
        Ok(handle)
    }

    /// Build and queue a task from an infallible action
    pub fn submit<F>(&self, action: F, priority: Priority, delay_ms: u64) -> Result<TaskHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(Task::new(action, priority, delay_ms))
    }

    /// Build and queue a task whose action may fail
    pub fn submit_fallible<F>(&self, action: F, priority: Priority, delay_ms: u64) -> Result<TaskHandle, SchedulerError>
    where
        F: FnOnce() -> eyre::Result<()> + Send + 'static,
    {
        self.submit_task(Task::fallible(action, priority, delay_ms))
    }

    /// Stop accepting tasks and let queued and delayed work drain
    ///
    /// Idempotent and non-blocking. Use [`Scheduler::await_termination`] to
    /// wait for the drain to finish.
    pub fn shutdown(&self) {
        debug!("Scheduler::shutdown: called");
        if self
            .shutdown
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Scheduler::shutdown: already shut down");
            return;
        }

        info!(
            queued = self.shared.ready.len(),
            delayed = self.shared.delayed.len(),
            "Scheduler shutting down, draining pending tasks"
        );
        self.shared.delayed.close();
        self.shared.ready.wake_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Block until every worker and the dispatcher have exited
    pub fn await_termination(&self) -> Result<(), SchedulerError> {
        debug!("Scheduler::await_termination: called");
        if !self.is_shutdown() {
            return Err(SchedulerError::NotShutDown);
        }

        let threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Threads { workers, dispatcher }) = threads else {
            debug!("Scheduler::await_termination: already terminated");
            return Ok(());
        };

        if dispatcher.join().is_err() {
            warn!("Delay dispatcher thread panicked");
        }
        workers.join();
        info!("Scheduler terminated");
        Ok(())
    }

    /// Snapshot of the aggregate counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
