use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "usage-census")]
#[command(about = "Count recently active users per platform and report them to a webhook")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Fetch, classify and report one snapshot
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Activity window in days
    #[arg(value_parser = clap::value_parser!(u32).range(1..=3650))]
    pub recency_days: u32,

    /// Use synthetic contacts instead of querying the contacts API
    #[arg(long)]
    pub test: bool,

    /// Tag profiles of platform-A-only users after classification
    #[arg(long)]
    pub tag: bool,

    /// Path to TOML configuration file (defaults to ./census.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
