//! Domain types for taskpool
//!
//! Core domain types: Priority, Task, TaskHandle

mod priority;
mod task;

pub use priority::Priority;
pub use task::{Action, Task, TaskHandle, TaskId, TaskOutcome};
