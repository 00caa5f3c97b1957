// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::loader::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `clustersched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "clustersched",
    version,
    about = "Run the cluster resource scheduler engine.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CLUSTERSCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print queues and nodes, but don't start the engine.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after this many seconds instead of waiting for Ctrl+C.
    #[arg(long, value_name = "SECS")]
    pub run_for: Option<u64>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
