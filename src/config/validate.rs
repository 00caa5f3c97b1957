// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SchedulerError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SchedulerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scheduler_section(cfg)?;
    validate_queues(cfg)?;
    validate_nodes(cfg)?;
    validate_telemetry(cfg)?;
    Ok(())
}

fn validate_scheduler_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.scheduler.tick_interval_ms == 0 {
        return Err(SchedulerError::ConfigError(
            "[scheduler].tick_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_queues(cfg: &RawConfigFile) -> Result<()> {
    if cfg.queue.is_empty() {
        return Err(SchedulerError::ConfigError(
            "config must declare at least one [[queue]]".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for q in cfg.queue.iter() {
        if q.name.trim().is_empty() {
            return Err(SchedulerError::ConfigError(
                "queue name must not be empty".to_string(),
            ));
        }
        if !seen.insert(q.name.as_str()) {
            return Err(SchedulerError::ConfigError(format!(
                "queue '{}' is declared more than once",
                q.name
            )));
        }
    }
    Ok(())
}

fn validate_nodes(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for node in cfg.node.iter() {
        if node.name.trim().is_empty() {
            return Err(SchedulerError::ConfigError(
                "node name must not be empty".to_string(),
            ));
        }
        if !seen.insert(node.name.as_str()) {
            return Err(SchedulerError::ConfigError(format!(
                "node '{}' is declared more than once",
                node.name
            )));
        }
        if node.slots == 0 {
            return Err(SchedulerError::ConfigError(format!(
                "node '{}' must have at least one slot",
                node.name
            )));
        }
        if node.resources.iter().any(|r| r.trim().is_empty()) {
            return Err(SchedulerError::ConfigError(format!(
                "node '{}' has an empty resource name",
                node.name
            )));
        }
    }
    Ok(())
}

fn validate_telemetry(cfg: &RawConfigFile) -> Result<()> {
    for (metric, limit) in cfg.telemetry.limits.iter() {
        if !limit.is_finite() || *limit < 0.0 {
            return Err(SchedulerError::ConfigError(format!(
                "[telemetry.limits].{metric} must be a finite, non-negative number (got {limit})"
            )));
        }
    }
    Ok(())
}
