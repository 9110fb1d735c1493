use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::workloads::Workload;

pub const DEFAULT_TARGET: &str = "http://127.0.0.1:5004";

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m): {err}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit the run summary as a single JSON line on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Load harness for token-protected HTTP APIs",
    long_about = "stampede runs virtual users against a target system under declarative scenarios, aggregates metrics and evaluates pass/fail thresholds.\n\nA workload supplies the per-iteration logic and a default plan; a YAML plan (--plan) replaces the default scenarios, thresholds and credentials.",
    after_help = "Examples:\n  stampede run liveness\n  stampede run get-nodes --client-id app --client-secret s3cret\n  stampede run get-nodes --plan plans/minimal.yaml --output json\n  TARGET=https://api.example.com stampede run liveness --vus 5 --duration 30s"
)]
pub struct Cli {
    /// Log filter (e.g. `info`, `debug`, `stampede_core=trace`). `RUST_LOG` wins when set.
    #[arg(long, global = true, value_name = "FILTER", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a workload
    #[command(
        long_about = "Run a workload with its default plan or the plan given by --plan.\n\nCLI flags override values from the plan."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Workload to execute
    #[arg(value_enum)]
    pub workload: Workload,

    /// YAML plan (scenarios, thresholds, credentials)
    #[arg(long, value_name = "PATH")]
    pub plan: Option<PathBuf>,

    /// Base URL of the system under test
    #[arg(long, env = "TARGET", default_value = DEFAULT_TARGET)]
    pub target: String,

    /// Override iterations (converts every scenario to constant-vus)
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Number of virtual users (converts every scenario to constant-vus)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Abort iterations still running this long after a scenario's graceful stop
    #[arg(long, value_parser = parse_duration)]
    pub hard_stop: Option<Duration>,

    /// Fail requests with no response after this long (default 60s)
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// OAuth2 client id (repeatable; paired with --client-secret in order)
    #[arg(long = "client-id", value_name = "ID", env = "STAMPEDE_CLIENT_ID")]
    pub client_ids: Vec<String>,

    /// OAuth2 client secret (repeatable)
    #[arg(
        long = "client-secret",
        value_name = "SECRET",
        env = "STAMPEDE_CLIENT_SECRET",
        hide_env_values = true
    )]
    pub client_secrets: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}
