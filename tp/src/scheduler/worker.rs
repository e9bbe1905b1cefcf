//! Worker pool: fixed set of threads executing jobs from the ready queue

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use crate::domain::TaskOutcome;

use super::core::Shared;
use super::queue::{Job, Pop};

/// Fixed-size set of worker threads
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `count` workers; on spawn failure the already running ones are
    /// left to exit once the ready queue closes
    pub(crate) fn spawn(count: usize, shared: &Arc<Shared>) -> std::io::Result<Self> {
        debug!(count, "WorkerPool::spawn: called");
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let worker = Worker {
                index,
                shared: Arc::clone(shared),
            };
            let handle = thread::Builder::new()
                .name(format!("taskpool-worker-{}", index))
                .spawn(move || worker.run())?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Block until every worker has exited
    pub(crate) fn join(self) {
        debug!(count = self.handles.len(), "WorkerPool::join: called");
        for handle in self.handles {
            let name = handle.thread().name().map(str::to_string);
            if handle.join().is_err() {
                warn!(?name, "Worker thread panicked outside a task");
            }
        }
    }
}

struct Worker {
    index: usize,
    shared: Arc<Shared>,
}

impl Worker {
    fn run(self) {
        debug!(worker = self.index, "Worker::run: started");
        loop {
            match self.shared.ready.pop_timeout(self.shared.poll_interval) {
                Pop::Job(job) => self.execute(job),
                Pop::Timeout => trace!(worker = self.index, "Worker::run: poll timeout"),
                Pop::Woken => trace!(worker = self.index, "Worker::run: woken, re-checking"),
                Pop::Closed => break,
            }
        }
        info!(worker = self.index, "Worker stopped");
    }

    fn execute(&self, job: Job) {
        let Job { handle, action } = job;
        handle.mark_started(Instant::now());
        let wait = handle.queue_wait().unwrap_or_default();
        self.shared.metrics.record_started(wait);
        debug!(
            worker = self.index,
            id = %handle.id(),
            priority = ?handle.priority(),
            wait_us = wait.as_micros() as u64,
            "Worker::execute: running task"
        );

        let outcome = match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => TaskOutcome::Succeeded,
            Ok(Err(err)) => {
                error!(worker = self.index, id = %handle.id(), priority = ?handle.priority(), "Task failed: {:#}", err);
                TaskOutcome::Failed(format!("{:#}", err))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(worker = self.index, id = %handle.id(), priority = ?handle.priority(), %message, "Task panicked");
                TaskOutcome::Panicked(message)
            }
        };

        self.shared.metrics.record_finished(outcome.is_success());
        handle.mark_finished(Instant::now(), outcome);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
