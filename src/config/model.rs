// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Configuration exactly as read from TOML, before semantic validation.
///
/// ```toml
/// [scheduler]
/// tick_interval_ms = 1000
/// max_schedule_attempts = 0
///
/// [[queue]]
/// name = "batch"
/// priority = 10
///
/// [[node]]
/// name = "n0"
/// slots = 4
/// resources = ["x86_64", "gpu"]
///
/// [telemetry.limits]
/// power_watts = 450.0
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// `[[queue]]` entries, in declaration order.
    #[serde(default)]
    pub queue: Vec<QueueConfig>,

    /// `[[node]]` entries, in declaration order. Declaration order is the
    /// registry index order, which first-fit matching walks.
    #[serde(default)]
    pub node: Vec<NodeConfig>,

    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` (or the
/// loader), so holders can rely on the checks in `config::validate`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub queue: Vec<QueueConfig>,
    pub node: Vec<NodeConfig>,
    pub telemetry: TelemetrySection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            scheduler: raw.scheduler,
            queue: raw.queue,
            node: raw.node,
            telemetry: raw.telemetry,
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Period of the timer that wakes the engine for a scheduling pass even
    /// when no caller posted anything.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Number of passes a head session may go unclaimed before it is
    /// terminated as starved. `0` disables the bound.
    #[serde(default = "default_max_schedule_attempts")]
    pub max_schedule_attempts: u32,

    /// Priority of the built-in first-fit policy (lower runs first).
    #[serde(default = "default_first_fit_priority")]
    pub first_fit_priority: i32,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_schedule_attempts() -> u32 {
    0
}

fn default_first_fit_priority() -> i32 {
    100
}

impl SchedulerSection {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_schedule_attempts: default_max_schedule_attempts(),
            first_fit_priority: default_first_fit_priority(),
        }
    }
}

/// `[[queue]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub name: String,

    /// Higher priority queues are visited first.
    #[serde(default = "default_queue_priority")]
    pub priority: i32,
}

fn default_queue_priority() -> i32 {
    1
}

/// `[[node]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub name: String,

    /// Processing elements offered by the node.
    #[serde(default = "default_slots")]
    pub slots: u32,

    /// Resource constraints the node satisfies (e.g. `"gpu"`).
    #[serde(default)]
    pub resources: Vec<String>,

    /// Whether the node starts out free (`UNALLOC`) instead of `UNKNOWN`.
    #[serde(default = "default_online")]
    pub online: bool,
}

fn default_slots() -> u32 {
    1
}

fn default_online() -> bool {
    true
}

/// `[telemetry]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetrySection {
    /// Metric name -> maximum value. A node reporting a value above its limit
    /// is ineligible for new allocations until it reports back under it.
    #[serde(default)]
    pub limits: BTreeMap<String, f64>,
}
