//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::SchedulerError;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: usize,

    /// Upper bound on a single blocking wait before loops re-check shutdown
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_worker_count() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Default configuration with the given number of workers
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    /// Get the poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.worker_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker-count must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "poll-interval-ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
