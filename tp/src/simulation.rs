//! Synthetic workload driver
//!
//! Submits a batch of sleeping tasks with random priorities and delays,
//! waits for all of them, then reports per-task queue wait alongside overall
//! throughput. Output is CSV by default so it can be fed to external
//! analysis scripts.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use eyre::{Context, Result, eyre};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{Priority, TaskId};
use crate::metrics::MetricsSnapshot;
use crate::scheduler::{CompletionLatch, Scheduler, SchedulerConfig};

/// CSV header, one row per task follows
pub const CSV_HEADER: &str =
    "TaskID,Priority,SubmissionTime,ExecutionStartTime,QueueWaitTime,TotalSimTimeMs,TotalTasks";

/// Workload shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of tasks to submit
    pub tasks: usize,

    /// Exclusive upper bound for the random per-task delay
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// How long each task sleeps
    #[serde(rename = "work-ms")]
    pub work_ms: u64,

    /// Seed for reproducible priorities and delays
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tasks: 100,
            max_delay_ms: 100,
            work_ms: 10,
            seed: None,
        }
    }
}

/// One submitted task, timestamps in nanoseconds since the simulation began
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub priority: Priority,
    pub submission_ns: u64,
    pub execution_start_ns: u64,
    pub queue_wait_ns: u64,
}

/// Everything measured by one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub total_tasks: usize,
    pub threads: usize,
    pub total_sim_ms: u64,
    pub tasks: Vec<TaskReport>,
    pub metrics: MetricsSnapshot,
}

impl SimulationReport {
    /// Mean queue wait across all tasks
    pub fn average_wait_ms(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        let total: u128 = self.tasks.iter().map(|t| t.queue_wait_ns as u128).sum();
        (total as f64 / self.tasks.len() as f64) / 1_000_000.0
    }

    /// Tasks per second of wall time
    pub fn throughput_per_sec(&self) -> f64 {
        if self.total_sim_ms == 0 {
            return 0.0;
        }
        self.tasks.len() as f64 / (self.total_sim_ms as f64 / 1000.0)
    }

    /// Write the header and one row per task
    pub fn write_csv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "{}", CSV_HEADER)?;
        for task in &self.tasks {
            writeln!(
                out,
                "{},{},{},{},{},{},{}",
                task.id,
                task.priority.to_string().to_uppercase(),
                task.submission_ns,
                task.execution_start_ns,
                task.queue_wait_ns,
                self.total_sim_ms,
                self.total_tasks
            )?;
        }
        Ok(())
    }
}

/// Counts the latch down when the task's action ends, even by panic
struct CountDownGuard(Arc<CompletionLatch>);

impl Drop for CountDownGuard {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

fn nanos_since(epoch: Instant, at: Instant) -> u64 {
    u64::try_from(at.saturating_duration_since(epoch).as_nanos()).unwrap_or(u64::MAX)
}

/// Synthetic workload runner
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimulationConfig,
    scheduler_config: SchedulerConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig, scheduler_config: SchedulerConfig) -> Self {
        Self {
            config,
            scheduler_config,
        }
    }

    /// Priority and delay for every task, in submission order
    pub fn workload(&self) -> Vec<(Priority, u64)> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        (0..self.config.tasks)
            .map(|_| {
                let priority = Priority::ALL[rng.random_range(0..Priority::ALL.len())];
                let delay_ms = if self.config.max_delay_ms == 0 {
                    0
                } else {
                    rng.random_range(0..self.config.max_delay_ms)
                };
                (priority, delay_ms)
            })
            .collect()
    }

    /// Submit the workload, wait for every task, and collect the report
    pub fn run(&self) -> Result<SimulationReport> {
        debug!(config = ?self.config, scheduler = ?self.scheduler_config, "Simulation::run: called");
        let scheduler = Scheduler::new(self.scheduler_config.clone()).context("Failed to start scheduler")?;
        let latch = Arc::new(CompletionLatch::new(self.config.tasks));
        let work = Duration::from_millis(self.config.work_ms);
        let workload = self.workload();

        let epoch = Instant::now();
        let mut handles = Vec::with_capacity(workload.len());
        for (priority, delay_ms) in workload {
            let guard = CountDownGuard(Arc::clone(&latch));
            let handle = scheduler
                .submit(
                    move || {
                        let _guard = guard;
                        thread::sleep(work);
                    },
                    priority,
                    delay_ms,
                )
                .context("Failed to submit simulated task")?;
            handles.push(handle);
        }

        latch.wait();
        let total_sim_ms = epoch.elapsed().as_millis() as u64;

        scheduler.shutdown();
        scheduler
            .await_termination()
            .context("Failed to wait for scheduler termination")?;

        let mut tasks = Vec::with_capacity(handles.len());
        for handle in &handles {
            let started = handle
                .execution_started_at()
                .ok_or_else(|| eyre!("Task {} finished without an execution start time", handle.id()))?;
            tasks.push(TaskReport {
                id: handle.id(),
                priority: handle.priority(),
                submission_ns: nanos_since(epoch, handle.submitted_at()),
                execution_start_ns: nanos_since(epoch, started),
                queue_wait_ns: nanos_since(handle.submitted_at(), started),
            });
        }

        let report = SimulationReport {
            total_tasks: self.config.tasks,
            threads: self.scheduler_config.worker_count,
            total_sim_ms,
            tasks,
            metrics: scheduler.metrics(),
        };
        info!(
            tasks = report.total_tasks,
            threads = report.threads,
            total_sim_ms,
            average_wait_ms = report.average_wait_ms(),
            "Simulation complete"
        );
        Ok(report)
    }
}
