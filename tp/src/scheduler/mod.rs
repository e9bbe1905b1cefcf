//! Scheduler for in-process tasks
//!
//! Priority ready queue, delay store with a dispatcher thread, and a fixed
//! worker pool, coordinated by [`Scheduler`].

mod config;
mod core;
mod delay;
mod error;
mod latch;
mod queue;
mod worker;

pub use config::SchedulerConfig;
pub use core::Scheduler;
pub use error::SchedulerError;
pub use latch::CompletionLatch;
