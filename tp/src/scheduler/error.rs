//! Scheduler error types

use thiserror::Error;

/// Errors returned by the scheduler's public operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler is shut down, cannot accept new tasks")]
    ShutDown,

    #[error("Scheduler is still running, call shutdown first")]
    NotShutDown,

    #[error("Invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SchedulerError {
    /// Check if this error means the scheduler refused work because it is shut down
    pub fn is_shut_down(&self) -> bool {
        matches!(self, SchedulerError::ShutDown)
    }
}
