#![allow(dead_code)]

pub use clustersched_test_utils::builders;
pub use clustersched_test_utils::{drain_events, init_tracing, with_timeout};

use clustersched::engine::SchedulerCore;
use clustersched::registry::NodeRegistry;
use clustersched::types::NodeState;

use crate::common::builders::ConfigFileBuilder;

/// Core with one `default` queue and `nodes` single-slot online nodes.
pub fn core_with_nodes(nodes: usize) -> SchedulerCore {
    let cfg = ConfigFileBuilder::new().with_nodes(nodes).build();
    SchedulerCore::from_config(&cfg).expect("core from config")
}

/// State of the node called `name`.
pub fn node_state(registry: &NodeRegistry, name: &str) -> NodeState {
    let idx = registry.lookup(name).expect("node registered");
    registry.node(idx).expect("node in arena").state()
}
