// src/registry/node.rs

//! Node records held by the registry arena.

use std::collections::BTreeSet;

use crate::types::{NodeIndex, NodeState, SessionId, StepId};

/// Named constraint descriptor a node carries (e.g. architecture, `gpu`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resource {
    pub constraint: String,
}

impl Resource {
    pub fn new(constraint: impl Into<String>) -> Self {
        Self {
            constraint: constraint.into(),
        }
    }
}

/// Allocation-state record for one node.
#[derive(Debug, Clone)]
pub struct Node {
    index: NodeIndex,
    name: String,
    pub(crate) state: NodeState,
    slots: u32,
    resources: Vec<Resource>,
    /// Whether the node reported itself up. Offline nodes that are still
    /// allocated keep their allocation state until released.
    pub(crate) online: bool,
    /// Metrics currently above their configured limit.
    pub(crate) over_limit: BTreeSet<String>,
    pub(crate) owner: Option<(SessionId, StepId)>,
}

impl Node {
    pub(crate) fn new(
        index: NodeIndex,
        name: String,
        slots: u32,
        resources: Vec<Resource>,
    ) -> Self {
        Self {
            index,
            name,
            state: NodeState::Unknown,
            slots,
            resources,
            online: false,
            over_limit: BTreeSet::new(),
            owner: None,
        }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Session and step currently holding the node, if any.
    pub fn owner(&self) -> Option<(SessionId, StepId)> {
        self.owner
    }

    pub fn has_resource(&self, constraint: &str) -> bool {
        self.resources.iter().any(|r| r.constraint == constraint)
    }

    /// Free, up, and not flagged by telemetry.
    pub fn is_eligible(&self) -> bool {
        self.state == NodeState::Unalloc && self.online && self.over_limit.is_empty()
    }

    /// State a node returns to when it stops being held.
    pub(crate) fn idle_state(&self) -> NodeState {
        if self.online {
            NodeState::Unalloc
        } else {
            NodeState::Unknown
        }
    }
}
