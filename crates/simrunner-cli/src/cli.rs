use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Lester Hedges",
    version,
    about = "simrun - Run batches of molecular dynamics engine processes with bounded concurrency and automatic retries.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every job in a manifest, retrying failures, and report the outcome.
    Run(RunArgs),
    /// Resolve a manifest and print the jobs and scheduler settings without running anything.
    Plan(PlanArgs),
}

/// Options shared by every subcommand that builds a runner from a manifest.
#[derive(Args, Debug, Clone)]
pub struct RunnerArgs {
    // --- Core Arguments ---
    /// Path to the job manifest in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub manifest: PathBuf,

    /// Path to an optional runner configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Name given to the runner in logs and summaries.
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Parent directory under which every job gets its own sub-directory.
    #[arg(short, long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    // --- Scheduling Overrides ---
    #[command(flatten)]
    pub mode: ModeFlags,

    /// Maximum number of jobs running at once in parallel mode.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, value_name = "NUM")]
    pub batch_size: Option<usize>,

    /// Maximum number of failed attempts tolerated per job.
    #[arg(short = 'r', long, value_name = "NUM")]
    pub max_retries: Option<usize>,

    /// Seconds between status sweeps in parallel mode.
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<f64>,

    // --- Generic Override ---
    /// Set a configuration value using KEY=VALUE format.
    /// Can be used multiple times (e.g., -S runner.max-retries=3).
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub set_values: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct ModeFlags {
    /// Run jobs one at a time in manifest order.
    #[arg(long)]
    pub serial: bool,
    /// Run jobs concurrently up to the batch size (default).
    #[arg(long)]
    pub parallel: bool,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub runner: RunnerArgs,

    /// Write a CSV status report for every job to this path once the run ends.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// Arguments for the `plan` subcommand.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub runner: RunnerArgs,
}
