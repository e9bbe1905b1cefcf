//! taskpool - in-process priority task scheduler
//!
//! Accepts units of work tagged with a priority and an optional delay and
//! dispatches them to a fixed pool of worker threads in priority order, ties
//! broken by submission order.
//!
//! # Core Concepts
//!
//! - **Priority first**: `High` runs before `Medium` before `Low`, evaluated
//!   when a worker pops, so later high-priority work overtakes queued low
//! - **FIFO within a priority**: earlier submissions run first
//! - **Delays gate eligibility**: a delayed task enters the ready queue once
//!   its trigger instant passes and is ordered normally from then on
//! - **Draining shutdown**: `shutdown` rejects new work but queued and delayed
//!   tasks still run
//!
//! # Example
//!
//! ```no_run
//! use taskpool::{Priority, Scheduler};
//!
//! let scheduler = Scheduler::with_workers(4)?;
//! let handle = scheduler.submit(|| println!("hello"), Priority::High, 0)?;
//! scheduler.shutdown();
//! scheduler.await_termination()?;
//! assert!(handle.execution_started_at().is_some());
//! # Ok::<(), taskpool::SchedulerError>(())
//! ```
//!
//! # Modules
//!
//! - [`domain`] - Priority, Task, and the task handle
//! - [`scheduler`] - Scheduler, queues, and worker pool
//! - [`metrics`] - Aggregate counters
//! - [`simulation`] - Synthetic workload driver
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod scheduler;
pub mod simulation;

// Re-export commonly used types
pub use config::Config;
pub use domain::{Priority, Task, TaskHandle, TaskId, TaskOutcome};
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use scheduler::{CompletionLatch, Scheduler, SchedulerConfig, SchedulerError};
pub use simulation::{Simulation, SimulationConfig, SimulationReport, TaskReport};
