#![allow(dead_code)]

use std::time::{Duration, SystemTime};

use clustersched::config::{ConfigFile, NodeConfig, QueueConfig, RawConfigFile};
use clustersched::model::Allocation;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts with no queues and no nodes; `build()` adds a `default` queue if
/// none was declared.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_queue(mut self, name: &str, priority: i32) -> Self {
        self.config.queue.push(QueueConfig {
            name: name.to_string(),
            priority,
        });
        self
    }

    pub fn with_node(self, name: &str, slots: u32) -> Self {
        self.with_node_resources(name, slots, &[])
    }

    pub fn with_node_resources(mut self, name: &str, slots: u32, resources: &[&str]) -> Self {
        self.config.node.push(NodeConfig {
            name: name.to_string(),
            slots,
            resources: resources.iter().map(|r| r.to_string()).collect(),
            online: true,
        });
        self
    }

    /// A node that starts `UNKNOWN` until telemetry reports it up.
    pub fn with_offline_node(mut self, name: &str, slots: u32) -> Self {
        self.config.node.push(NodeConfig {
            name: name.to_string(),
            slots,
            resources: Vec::new(),
            online: false,
        });
        self
    }

    /// `count` online nodes named `n0..n{count-1}`, one slot each.
    pub fn with_nodes(mut self, count: usize) -> Self {
        for i in 0..count {
            self = self.with_node(&format!("n{i}"), 1);
        }
        self
    }

    pub fn with_tick_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.tick_interval_ms = ms;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.scheduler.max_schedule_attempts = attempts;
        self
    }

    pub fn with_first_fit_priority(mut self, priority: i32) -> Self {
        self.config.scheduler.first_fit_priority = priority;
        self
    }

    pub fn with_limit(mut self, metric: &str, limit: f64) -> Self {
        self.config.telemetry.limits.insert(metric.to_string(), limit);
        self
    }

    pub fn build_raw(mut self) -> RawConfigFile {
        if self.config.queue.is_empty() {
            self = self.with_queue("default", 1);
        }
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.build_raw()).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Allocation`.
pub struct AllocationBuilder {
    alloc: Allocation,
}

impl AllocationBuilder {
    /// One exclusive node, any queue.
    pub fn new() -> Self {
        Self {
            alloc: Allocation::default(),
        }
    }

    pub fn nodes(mut self, min: u32, max: u32) -> Self {
        self.alloc.min_nodes = min;
        self.alloc.max_nodes = max;
        self
    }

    pub fn pes(mut self, min: u32, max: u32) -> Self {
        self.alloc.min_pes = min;
        self.alloc.max_pes = max;
        self
    }

    pub fn shared(mut self) -> Self {
        self.alloc.exclusive = false;
        self
    }

    pub fn queue(mut self, name: &str) -> Self {
        self.alloc.queue = Some(name.to_string());
        self
    }

    pub fn constraint(mut self, tag: &str) -> Self {
        self.alloc.constraints.push(tag.to_string());
        self
    }

    pub fn on_node(mut self, name: &str) -> Self {
        self.alloc.nodes.push(name.to_string());
        self
    }

    pub fn walltime(mut self, walltime: Duration) -> Self {
        self.alloc.walltime = Some(walltime);
        self
    }

    pub fn begin(mut self, at: SystemTime) -> Self {
        self.alloc.begin = Some(at);
        self
    }

    pub fn account(mut self, account: &str) -> Self {
        self.alloc.account = Some(account.to_string());
        self
    }

    pub fn build(self) -> Allocation {
        self.alloc
    }
}

impl Default for AllocationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
