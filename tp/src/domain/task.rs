//! Task types: immutable work description plus a write-once execution record

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::Priority;

/// Boxed unit of work run exactly once by a worker
pub type Action = Box<dyn FnOnce() -> eyre::Result<()> + Send + 'static>;

/// Tie-breaker for tasks created at the same instant
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Globally unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a task's action ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "message")]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Fields written by the worker, each at most once
#[derive(Debug, Default)]
struct ExecutionRecord {
    started_at: OnceLock<Instant>,
    finished_at: OnceLock<Instant>,
    outcome: OnceLock<TaskOutcome>,
}

#[derive(Debug)]
struct TaskMeta {
    id: TaskId,
    priority: Priority,
    delay: Duration,
    submitted_at: Instant,
    sequence: u64,
    record: ExecutionRecord,
}

/// Shared, read-only view of a task
///
/// Cloning is cheap. Execution fields read as `None` until the worker has
/// written them.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    inner: Arc<TaskMeta>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    /// Delay before the task becomes eligible
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Instant captured when the task was constructed
    pub fn submitted_at(&self) -> Instant {
        self.inner.submitted_at
    }

    /// Instant a worker dequeued the task
    pub fn execution_started_at(&self) -> Option<Instant> {
        self.inner.record.started_at.get().copied()
    }

    /// Instant the action returned or panicked
    pub fn finished_at(&self) -> Option<Instant> {
        self.inner.record.finished_at.get().copied()
    }

    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.inner.record.outcome.get()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.record.outcome.get().is_some()
    }

    /// Time spent between construction and dequeue
    pub fn queue_wait(&self) -> Option<Duration> {
        self.execution_started_at()
            .map(|started| started.saturating_duration_since(self.inner.submitted_at))
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.inner.sequence
    }

    /// Stamp the execution start; returns false if already stamped
    pub(crate) fn mark_started(&self, at: Instant) -> bool {
        self.inner.record.started_at.set(at).is_ok()
    }

    pub(crate) fn mark_finished(&self, at: Instant, outcome: TaskOutcome) {
        let _ = self.inner.record.finished_at.set(at);
        let _ = self.inner.record.outcome.set(outcome);
    }
}

/// A unit of work tagged with a priority and an optional delay
pub struct Task {
    handle: TaskHandle,
    action: Action,
}

impl Task {
    /// Create a task from an infallible action
    pub fn new<F>(action: F, priority: Priority, delay_ms: u64) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::fallible(
            move || {
                action();
                Ok(())
            },
            priority,
            delay_ms,
        )
    }

    /// Create a task whose action may return an error
    pub fn fallible<F>(action: F, priority: Priority, delay_ms: u64) -> Self
    where
        F: FnOnce() -> eyre::Result<()> + Send + 'static,
    {
        let meta = TaskMeta {
            id: TaskId::generate(),
            priority,
            delay: Duration::from_millis(delay_ms),
            submitted_at: Instant::now(),
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            record: ExecutionRecord::default(),
        };
        debug!(id = %meta.id, ?priority, delay_ms, "Task::fallible: created");
        Self {
            handle: TaskHandle { inner: Arc::new(meta) },
            action: Box::new(action),
        }
    }

    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    pub fn priority(&self) -> Priority {
        self.handle.priority()
    }

    pub fn delay(&self) -> Duration {
        self.handle.delay()
    }

    pub fn submitted_at(&self) -> Instant {
        self.handle.submitted_at()
    }

    /// Handle for reading timestamps after the task has run
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    pub(crate) fn into_parts(self) -> (TaskHandle, Action) {
        (self.handle, self.action)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("delay", &self.delay())
            .finish_non_exhaustive()
    }
}
