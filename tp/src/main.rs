//! taskpool - priority task scheduler
//!
//! CLI entry point for running synthetic workloads through the scheduler.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use taskpool::cli::{Cli, Command, OutputFormat};
use taskpool::config::Config;
use taskpool::simulation::{Simulation, SimulationReport};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskpool")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("taskpool.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_thread_names(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Simulate {
            tasks,
            threads,
            max_delay_ms,
            work_ms,
            seed,
            format,
        } => {
            let mut config = config;
            if let Some(tasks) = tasks {
                config.simulation.tasks = tasks;
            }
            if let Some(threads) = threads {
                config.scheduler.worker_count = threads;
            }
            if let Some(max_delay_ms) = max_delay_ms {
                config.simulation.max_delay_ms = max_delay_ms;
            }
            if let Some(work_ms) = work_ms {
                config.simulation.work_ms = work_ms;
            }
            if seed.is_some() {
                config.simulation.seed = seed;
            }
            cmd_simulate(&config, format)
        }
        Command::Config => cmd_config(&config),
    }
}

/// Run the synthetic workload and print the report
fn cmd_simulate(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_simulate: called");
    let simulation = Simulation::new(config.simulation.clone(), config.scheduler.clone());
    let report = simulation.run().context("Simulation failed")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Csv => report.write_csv(&mut out).context("Failed to write CSV")?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &report).context("Failed to write JSON")?;
            writeln!(out)?;
        }
        OutputFormat::Text => print_summary(&mut out, &report)?,
    }
    Ok(())
}

fn print_summary<W: Write>(out: &mut W, report: &SimulationReport) -> Result<()> {
    let metrics = &report.metrics;
    writeln!(out, "{}", "Results:".bold())?;
    writeln!(out, "  Total Tasks Processed: {}", report.tasks.len().to_string().cyan())?;
    writeln!(out, "  Worker Threads: {}", report.threads)?;
    writeln!(out, "  Total Simulation Time: {} ms", report.total_sim_ms)?;
    writeln!(out, "  Average Queue Wait Time: {:.4} ms", report.average_wait_ms())?;
    writeln!(out, "  Throughput: {:.2} tasks/sec", report.throughput_per_sec())?;
    writeln!(
        out,
        "  By Priority: {} high, {} medium, {} low",
        metrics.high_priority.to_string().red(),
        metrics.medium_priority.to_string().yellow(),
        metrics.low_priority.to_string().green()
    )?;
    if metrics.failed > 0 {
        writeln!(out, "  {} {} tasks failed", "✗".red(), metrics.failed)?;
    } else {
        writeln!(out, "  {} all tasks succeeded", "✓".green())?;
    }
    Ok(())
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", config.to_yaml()?);
    Ok(())
}
