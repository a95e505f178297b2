//! rq - bounded-concurrency retry queue driver
//!
//! CLI entry point that pushes a batch of flaky simulated tasks through the
//! queue and reports per-task outcomes plus summary statistics.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};

use retryqueue::cli::Cli;
use retryqueue::config::QueueConfig;
use retryqueue::events::spawn_event_logger;
use retryqueue::queue::RetryQueue;
use retryqueue::runner::FlakyRunner;

fn setup_logging(verbose: bool) {
    // Logs go to stderr so task output on stdout stays clean
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    // Load configuration
    let mut config = QueueConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // CLI flags override file values
    if let Some(max_concurrent) = cli.max_concurrent {
        config.max_concurrent = max_concurrent;
    }
    if let Some(retry_limit) = cli.retry_limit {
        config.default_retry_limit = retry_limit;
    }

    if !(0.0..=1.0).contains(&cli.fail_rate) {
        return Err(eyre::eyre!("fail-rate must be in [0.0, 1.0], got {}", cli.fail_rate));
    }
    config.validate()?;

    info!(
        "Starting run: tasks={}, max_concurrent={}, retry_limit={}, fail_rate={}",
        cli.tasks, config.max_concurrent, config.default_retry_limit, cli.fail_rate
    );

    run_batch(&cli, config).await
}

/// Enqueue the batch, wait for every handle, and print a summary
async fn run_batch(cli: &Cli, config: QueueConfig) -> Result<()> {
    let runner = Arc::new(FlakyRunner::new(cli.fail_rate, Duration::from_millis(cli.max_latency_ms)));
    let queue = RetryQueue::new(runner, config.clone())?;

    let logger_handle = match &cli.event_log {
        Some(path) => {
            Some(spawn_event_logger(&queue.event_bus(), path).context("Failed to start event logger")?)
        }
        None => None,
    };

    println!("Retry queue run");
    println!("---------------");
    println!("Tasks:          {}", cli.tasks);
    println!("Max concurrent: {}", config.max_concurrent);
    println!("Retry limit:    {}", config.default_retry_limit);
    println!("Fail rate:      {:.2}", cli.fail_rate);
    println!();

    let mut waiters = Vec::new();
    for id in 1..=cli.tasks {
        let handle = queue.enqueue(id).await;
        waiters.push(async move {
            match handle.await {
                Ok(message) => {
                    println!("{} {}", "DONE:".green().bold(), message);
                    true
                }
                Err(e) => {
                    println!("{} {}", "FAILED:".red().bold(), e);
                    false
                }
            }
        });
    }

    let results = futures::future::join_all(waiters).await;
    queue.idle().await;

    let stats = queue.stats().await;
    println!();
    println!("Queue statistics");
    println!("----------------");
    println!("Enqueued:         {}", stats.total_enqueued);
    println!("Completed:        {}", stats.total_completed);
    println!("Abandoned:        {}", stats.total_abandoned);
    println!("Retries:          {}", stats.total_retries);
    println!("Peak running:     {}", stats.peak_running);
    println!("Peak queue depth: {}", stats.peak_queue_depth);

    // Drop the queue so the event bus closes and the logger drains
    drop(queue);
    if let Some(handle) = logger_handle {
        match handle.await {
            Ok(()) => {
                if let Some(path) = &cli.event_log {
                    println!();
                    println!("Event log written to: {}", path.display());
                }
            }
            Err(e) => warn!("Event logger task failed: {}", e),
        }
    }

    let abandoned = results.iter().filter(|ok| !**ok).count();
    println!();
    if abandoned > 0 {
        println!("{} {} of {} tasks abandoned", "✗".red(), abandoned, cli.tasks);
        std::process::exit(1);
    }

    println!("{} All {} tasks completed", "✓".green(), cli.tasks);
    Ok(())
}
