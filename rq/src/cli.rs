//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// Drive a batch of simulated tasks through the retry queue
#[derive(Parser, Debug)]
#[command(
    name = "rq",
    about = "Run a batch of flaky tasks through a bounded-concurrency retry queue",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Number of tasks to enqueue
    #[arg(short = 'n', long, default_value = "20")]
    pub tasks: u64,

    /// Maximum items running at once (overrides config)
    #[arg(short = 'm', long)]
    pub max_concurrent: Option<usize>,

    /// Retry limit per task (overrides config)
    #[arg(short = 'r', long)]
    pub retry_limit: Option<u32>,

    /// Probability in [0.0, 1.0] that a single attempt fails
    #[arg(long, default_value = "0.75")]
    pub fail_rate: f64,

    /// Upper bound for simulated task latency in milliseconds
    #[arg(long, default_value = "2000")]
    pub max_latency_ms: u64,

    /// Write queue events as JSONL to this file
    #[arg(long, value_name = "PATH")]
    pub event_log: Option<PathBuf>,
}
