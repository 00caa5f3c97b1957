// src/logging.rs

//! Subscriber setup for the `clustersched` binary.
//!
//! The filter comes from, in order: `--log-level`, the `CLUSTERSCHED_LOG`
//! environment variable (any `EnvFilter` directive string, e.g.
//! `info,clustersched::engine=trace`), and finally `info`.
//!
//! Everything is written to stderr. Stdout belongs to `--dry-run`.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "CLUSTERSCHED_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Call once, before the engine starts.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directive = filter_directive(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}'"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// Pick the filter directive string. A blank or unparsable environment value
/// falls back to the default.
pub fn filter_directive(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return tracing::Level::from(level).to_string().to_lowercase();
    }
    match env_value.map(str::trim) {
        Some(s) if !s.is_empty() && EnvFilter::try_new(s).is_ok() => s.to_string(),
        _ => DEFAULT_DIRECTIVE.to_string(),
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
