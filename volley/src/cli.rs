use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use volley_core::PercentileMode;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_var(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("invalid variable '{input}' (expected KEY=VALUE)"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid variable '{input}': empty name"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_percentiles(input: &str) -> Result<PercentileMode, String> {
    input
        .parse()
        .map_err(|_| format!("invalid percentile mode '{input}' (expected exact or histogram)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables.
    HumanReadable,
    /// One JSON line per scenario plus a summary line (NDJSON).
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    author,
    version,
    about = "Configuration-driven performance test runner",
    long_about = "volley runs performance test scenarios described in a YAML document.\n\nEach scenario is a list of requests (http, https, graphql, soap, tcp, udp, mqtt, jms, jdbc) executed by a number of concurrent workers for a number of iterations, optionally ramped up and held. Requests can use `${name}` variables from the document, CSV data files and values extracted from earlier responses.\n\nA scenario passes when its success rate reaches its `successThreshold`.",
    after_help = "Examples:\n  volley run plan.yaml\n  volley run plan.yaml --scenario checkout --threads 20 --iterations 100\n  volley run plan.yaml --var baseUrl=https://staging.example.com --output json\n  volley validate plan.yaml\n\nLogging goes to stderr; set VOLLEY_LOG (or RUST_LOG) to e.g. `debug`."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scenarios of a document
    #[command(
        long_about = "Run every scenario of a document in order, then print a summary.\n\nCLI flags override values from the document."
    )]
    Run(RunArgs),

    /// Check a document without sending any request
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the scenario document (.yaml)
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario document (.yaml)
    pub file: PathBuf,

    /// Only run scenarios with this name (repeatable)
    #[arg(long = "scenario", value_name = "NAME")]
    pub scenarios: Vec<String>,

    /// Override `threads` of every scenario
    #[arg(long)]
    pub threads: Option<u64>,

    /// Override `iterations` of every scenario
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Override the hold phase of every scenario (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_duration)]
    pub hold: Option<Duration>,

    /// Add/override a global variable (repeatable, KEY=VALUE)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Fail requests that reference undefined variables instead of sending them
    #[arg(long)]
    pub strict_vars: bool,

    /// Default per-request timeout (e.g. 5s)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// TCP connect timeout for HTTP-based protocols
    #[arg(long, value_parser = parse_duration)]
    pub connect_timeout: Option<Duration>,

    /// Percentile storage: exact or histogram
    #[arg(long, value_parser = parse_percentiles)]
    pub percentiles: Option<PercentileMode>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Also write the full report as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}
