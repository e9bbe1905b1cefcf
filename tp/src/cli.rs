//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// taskpool - priority task scheduler driver
#[derive(Parser, Debug)]
#[command(
    name = "tp",
    about = "Run synthetic workloads through the taskpool scheduler",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit random tasks and report per-task queue wait
    Simulate {
        /// Number of tasks (default from config)
        #[arg(value_name = "TASKS")]
        tasks: Option<usize>,

        /// Number of worker threads (default from config)
        #[arg(value_name = "THREADS")]
        threads: Option<usize>,

        /// Exclusive upper bound for random task delay
        #[arg(long)]
        max_delay_ms: Option<u64>,

        /// Time each task sleeps
        #[arg(long)]
        work_ms: Option<u64>,

        /// Seed for reproducible priorities and delays
        #[arg(long)]
        seed: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    Text,
}
