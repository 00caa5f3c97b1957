// src/registry/mod.rs

//! Node registry and resource matching.
//!
//! Nodes live in an append-only arena indexed by [`NodeIndex`], so steps can
//! hold plain indices that never dangle. All commit/release operations keep
//! a node's allocation state and its `owner` in lockstep.

pub mod node;

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::collab::{MetricRecord, MetricValue};
use crate::errors::{Result, SchedulerError};
use crate::model::{Allocation, Session, Step};
use crate::types::{NodeIndex, NodeState, SessionId, StepId};

pub use node::{Node, Resource};

/// Telemetry key whose text value (`up` / `down`) toggles a node online.
pub const STATE_METRIC: &str = "state";

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
    by_name: HashMap<String, NodeIndex>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node in the `Unknown` state.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        slots: u32,
        resources: Vec<Resource>,
    ) -> Result<NodeIndex> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(SchedulerError::DuplicateNode(name));
        }
        let index = NodeIndex(self.nodes.len());
        debug!(node = %name, %index, slots, "registering node");
        self.by_name.insert(name.clone(), index);
        self.nodes.push(Node::new(index, name, slots.max(1), resources));
        Ok(index)
    }

    /// Mark a node as up. `Unknown` nodes become `Unalloc`.
    pub fn set_online(&mut self, name: &str) -> Result<()> {
        let node = self.node_by_name_mut(name)?;
        node.online = true;
        if node.state == NodeState::Unknown {
            node.state = NodeState::Unalloc;
            info!(node = %node.name(), "node online");
        }
        Ok(())
    }

    /// Mark a node as down. Free nodes go back to `Unknown`; allocated nodes
    /// keep their state until their step releases them.
    pub fn set_offline(&mut self, name: &str) -> Result<()> {
        let node = self.node_by_name_mut(name)?;
        node.online = false;
        if node.state == NodeState::Unalloc {
            node.state = NodeState::Unknown;
        }
        info!(node = %node.name(), state = %node.state, "node offline");
        Ok(())
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0)
    }

    pub fn lookup(&self, name: &str) -> Option<NodeIndex> {
        self.by_name.get(name).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Number of registered nodes.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Sum of slots over all registered nodes.
    pub fn total_slots(&self) -> u64 {
        self.nodes.iter().map(|n| u64::from(n.slots())).sum()
    }

    pub fn count_in(&self, state: NodeState) -> usize {
        self.nodes.iter().filter(|n| n.state == state).count()
    }

    pub fn names_of(&self, indices: &[NodeIndex]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|i| self.node(*i))
            .map(|n| n.name().to_string())
            .collect()
    }

    /// Default first-fit matching.
    ///
    /// Walks nodes by ascending index, keeping those that are eligible, carry
    /// every resource constraint and (if the allocation names nodes) are
    /// named. Takes up to `max_nodes`. Once `min_nodes` is met, a node whose
    /// slots would push the total past `max_pes` is skipped, and the walk
    /// stops when `max_pes` is reached. Nodes are taken whole, so meeting
    /// `min_nodes` alone may already exceed `max_pes`. Returns `None` when
    /// fewer than `min_nodes` nodes or `min_pes` PEs can be found.
    pub fn find_candidates(&self, alloc: &Allocation) -> Option<Vec<NodeIndex>> {
        let max_nodes = alloc.max_nodes as usize;
        let min_nodes = alloc.min_nodes as usize;
        let mut selected = Vec::new();
        let mut pes: u64 = 0;

        let max_pes = (alloc.max_pes > 0).then(|| u64::from(alloc.max_pes));

        for node in self.nodes.iter() {
            if selected.len() >= max_nodes {
                break;
            }
            let min_met = selected.len() >= min_nodes;
            if min_met && max_pes.is_some_and(|cap| pes >= cap) {
                break;
            }
            if !node.is_eligible() {
                continue;
            }
            if !alloc.nodes.is_empty() && !alloc.nodes.iter().any(|n| n == node.name()) {
                continue;
            }
            if !alloc.resource_constraints().all(|c| node.has_resource(c)) {
                continue;
            }
            if min_met && max_pes.is_some_and(|cap| pes + u64::from(node.slots()) > cap) {
                continue;
            }
            selected.push(node.index());
            pes += u64::from(node.slots());
        }

        if selected.len() < min_nodes || pes < u64::from(alloc.min_pes) {
            debug!(
                found = selected.len(),
                min_nodes,
                pes,
                min_pes = alloc.min_pes,
                "insufficient eligible nodes"
            );
            return None;
        }
        Some(selected)
    }

    /// Commit `nodes` to a new step of `session`.
    ///
    /// Every node must currently be `Unalloc`; otherwise nothing is touched
    /// and `NodeUnavailable` is returned. Nodes become `Exclusive` when the
    /// allocation asked for exclusivity, `Alloc` otherwise.
    pub fn commit_step(&mut self, session: &mut Session, nodes: &[NodeIndex]) -> Result<StepId> {
        for (pos, idx) in nodes.iter().enumerate() {
            let node = self
                .nodes
                .get(idx.0)
                .ok_or_else(|| SchedulerError::UnknownNode(idx.to_string()))?;
            if node.state != NodeState::Unalloc || nodes[..pos].contains(idx) {
                return Err(SchedulerError::NodeUnavailable(node.name().to_string()));
            }
        }

        let target = if session.allocation().exclusive {
            NodeState::Exclusive
        } else {
            NodeState::Alloc
        };
        let session_id = session.id();
        let step = session.open_step();
        let step_id = step.id();

        for idx in nodes.iter() {
            let node = &mut self.nodes[idx.0];
            node.state = target;
            node.owner = Some((session_id, step_id));
            step.nodes.push(*idx);
        }

        info!(
            session = session_id,
            step = step_id,
            nodes = nodes.len(),
            state = %target,
            "committed nodes to step"
        );
        Ok(step_id)
    }

    /// Return every node held by `step` to its idle state. Safe on empty
    /// steps.
    pub fn release_step(&mut self, session: SessionId, step: &mut Step) {
        let step_id = step.id();
        for idx in step.nodes.drain(..) {
            let Some(node) = self.nodes.get_mut(idx.0) else {
                warn!(session, step = step_id, %idx, "released node not in registry");
                continue;
            };
            if node.owner != Some((session, step_id)) {
                warn!(
                    session,
                    step = step_id,
                    node = %node.name(),
                    owner = ?node.owner,
                    "releasing node not owned by this step"
                );
                continue;
            }
            node.owner = None;
            node.state = node.idle_state();
            debug!(
                session,
                step = step_id,
                node = %node.name(),
                state = %node.state,
                "node released"
            );
        }
    }

    /// Release every step of a session and drop the now-empty steps.
    pub fn release_session(&mut self, session: &mut Session) {
        let id = session.id();
        for step in session.steps_mut() {
            self.release_step(id, step);
        }
        session.prune_empty_steps();
    }

    /// Apply a batch of telemetry samples.
    ///
    /// - `state = "up" | "down"` toggles the node online/offline.
    /// - A numeric metric above its entry in `limits` flags the node
    ///   ineligible; dropping back to or under the limit clears the flag.
    ///
    /// Samples for unknown nodes are ignored.
    pub fn apply_telemetry(&mut self, records: &[MetricRecord], limits: &BTreeMap<String, f64>) {
        for record in records {
            let Some(idx) = self.lookup(&record.node) else {
                debug!(
                    node = %record.node,
                    key = %record.key,
                    "telemetry for unknown node; ignoring"
                );
                continue;
            };

            match (&record.value, record.key.as_str()) {
                (MetricValue::Text(v), STATE_METRIC) => {
                    let result = match v.trim().to_lowercase().as_str() {
                        "up" | "online" => self.set_online(&record.node),
                        "down" | "offline" => self.set_offline(&record.node),
                        other => {
                            warn!(
                                node = %record.node,
                                value = %other,
                                "unrecognised node state report"
                            );
                            Ok(())
                        }
                    };
                    if let Err(e) = result {
                        warn!(node = %record.node, error = %e, "failed to apply state report");
                    }
                }
                (MetricValue::Number(v), key) => {
                    let Some(limit) = limits.get(key) else {
                        continue;
                    };
                    let node = &mut self.nodes[idx.0];
                    if *v > *limit {
                        if node.over_limit.insert(key.to_string()) {
                            warn!(
                                node = %node.name(),
                                metric = %key,
                                value = v,
                                limit,
                                "node over limit; ineligible"
                            );
                        }
                    } else if node.over_limit.remove(key) {
                        info!(
                            node = %node.name(),
                            metric = %key,
                            value = v,
                            limit,
                            "node back under limit"
                        );
                    }
                }
                (MetricValue::Text(_), _) => {}
            }
        }
    }

    /// Drop every node. Only called once all sessions are gone.
    pub fn clear(&mut self) {
        let held = self.nodes.iter().filter(|n| n.owner.is_some()).count();
        if held > 0 {
            warn!(held, "clearing registry with nodes still held");
        }
        self.nodes.clear();
        self.by_name.clear();
    }

    fn node_by_name_mut(&mut self, name: &str) -> Result<&mut Node> {
        let idx = self
            .lookup(name)
            .ok_or_else(|| SchedulerError::UnknownNode(name.to_string()))?;
        Ok(&mut self.nodes[idx.0])
    }
}
