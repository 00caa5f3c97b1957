// src/model/allocation.rs

//! Resource requests and their synchronous validation.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use regex::Regex;

use crate::errors::{Result, SchedulerError};

/// Constraint tag prefix that requests provisioning with a named image.
pub const IMAGE_CONSTRAINT_PREFIX: &str = "image:";

static CONSTRAINT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.:=+-]+$").expect("constraint tag pattern is valid")
});

/// A request for compute resources.
///
/// `min_pes` / `max_pes` of `0` mean "unconstrained". An empty `nodes` list
/// means "any node in the registry".
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub priority: i32,
    pub account: Option<String>,
    pub name: Option<String>,
    pub gid: u32,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub min_pes: u32,
    pub max_pes: u32,
    /// Earliest wall-clock time the allocation may start.
    pub begin: Option<SystemTime>,
    /// Maximum time the allocation may stay allocated.
    pub walltime: Option<Duration>,
    pub exclusive: bool,
    pub caller_uid: u32,
    pub caller_gid: u32,
    /// Explicit node names the allocation must be placed on.
    pub nodes: Vec<String>,
    /// File with one node name per line, merged into `nodes` on submission.
    pub nodefile: Option<PathBuf>,
    /// Target queue; `None` selects the first declared queue.
    pub queue: Option<String>,
    /// Ordered constraint tags. `image:<name>` requests provisioning, any
    /// other tag must be carried by every selected node.
    pub constraints: Vec<String>,
}

impl Default for Allocation {
    fn default() -> Self {
        Self {
            priority: 0,
            account: None,
            name: None,
            gid: 0,
            min_nodes: 1,
            max_nodes: 1,
            min_pes: 0,
            max_pes: 0,
            begin: None,
            walltime: None,
            exclusive: true,
            caller_uid: 0,
            caller_gid: 0,
            nodes: Vec::new(),
            nodefile: None,
            queue: None,
            constraints: Vec::new(),
        }
    }
}

impl Allocation {
    /// Check size, PE and constraint sanity. Performs no IO.
    pub fn validate(&self) -> Result<()> {
        if self.min_nodes == 0 {
            return Err(invalid("min_nodes must be >= 1"));
        }
        if self.max_nodes < self.min_nodes {
            return Err(invalid(format!(
                "max_nodes ({}) < min_nodes ({})",
                self.max_nodes, self.min_nodes
            )));
        }
        if self.max_pes != 0 && self.max_pes < self.min_pes {
            return Err(invalid(format!(
                "max_pes ({}) < min_pes ({})",
                self.max_pes, self.min_pes
            )));
        }

        let mut seen = HashSet::new();
        let mut images = 0;
        for tag in self.constraints.iter() {
            if !CONSTRAINT_TAG.is_match(tag) {
                return Err(invalid(format!("malformed constraint tag '{tag}'")));
            }
            if !seen.insert(tag.as_str()) {
                return Err(invalid(format!("duplicate constraint tag '{tag}'")));
            }
            if let Some(image) = tag.strip_prefix(IMAGE_CONSTRAINT_PREFIX) {
                if image.is_empty() {
                    return Err(invalid("image constraint needs an image name"));
                }
                images += 1;
            }
        }
        if images > 1 {
            return Err(invalid("at most one image constraint may be given"));
        }

        let mut seen_nodes = HashSet::new();
        for node in self.nodes.iter() {
            if node.trim().is_empty() {
                return Err(invalid("explicit node names must not be empty"));
            }
            if !seen_nodes.insert(node.as_str()) {
                return Err(invalid(format!("node '{node}' listed more than once")));
            }
        }
        if !self.nodes.is_empty() && (self.nodes.len() as u32) < self.min_nodes {
            return Err(invalid(format!(
                "explicit node list has {} entries but min_nodes is {}",
                self.nodes.len(),
                self.min_nodes
            )));
        }

        Ok(())
    }

    /// Read `nodefile` (if any) and merge its node names into `nodes`.
    ///
    /// Blank lines and `#` comments are ignored. Names already present in
    /// `nodes` are not added twice. The reference is cleared once resolved.
    pub fn resolve_nodefile(&mut self) -> Result<()> {
        let Some(path) = self.nodefile.take() else {
            return Ok(());
        };

        let contents = fs::read_to_string(&path).map_err(|e| {
            invalid(format!("cannot read node file {}: {e}", path.display()))
        })?;

        for line in contents.lines() {
            let name = line.split('#').next().unwrap_or("").trim();
            if name.is_empty() {
                continue;
            }
            if !self.nodes.iter().any(|n| n == name) {
                self.nodes.push(name.to_string());
            }
        }
        Ok(())
    }

    /// Image requested through an `image:<name>` constraint.
    pub fn image(&self) -> Option<&str> {
        self.constraints
            .iter()
            .find_map(|c| c.strip_prefix(IMAGE_CONSTRAINT_PREFIX))
    }

    /// Constraint tags that nodes must carry (everything except `image:`).
    pub fn resource_constraints(&self) -> impl Iterator<Item = &str> {
        self.constraints
            .iter()
            .filter(|c| !c.starts_with(IMAGE_CONSTRAINT_PREFIX))
            .map(String::as_str)
    }

    /// Whether the requested start time has been reached.
    pub fn may_start_at(&self, now: SystemTime) -> bool {
        self.begin.is_none_or(|begin| begin <= now)
    }
}

fn invalid(msg: impl Into<String>) -> SchedulerError {
    SchedulerError::InvalidAllocation(msg.into())
}
