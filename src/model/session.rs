// src/model/session.rs

//! Sessions, their steps and the jobs steps are correlated with.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::debug;

use crate::model::allocation::Allocation;
use crate::types::{JobId, NodeIndex, SessionId, SessionState, StepId, TerminationReason};

/// Caller-supplied identity/context. Opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub label: String,
}

/// One schedulable unit of work within a session.
///
/// References its job by id and owns the list of nodes committed to it. The
/// allocation is reached through the owning session.
#[derive(Debug, Clone)]
pub struct Step {
    id: StepId,
    job: Option<JobId>,
    pub(crate) nodes: Vec<NodeIndex>,
}

impl Step {
    pub(crate) fn new(id: StepId, job: Option<JobId>) -> Self {
        Self {
            id,
            job,
            nodes: Vec::new(),
        }
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn job(&self) -> Option<JobId> {
        self.job
    }

    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }
}

/// Where a session stands with respect to node provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStatus {
    /// The allocation carries no image constraint.
    NotRequired,
    /// An image is requested but nodes have not been committed yet.
    Pending,
    /// Nodes are committed and a request is in flight.
    Requested,
    /// The collaborator reported success.
    Completed,
}

/// Notification delivered to the submitter of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Resources are committed; `nodes` are the node names.
    Allocated { session: SessionId, nodes: Vec<String> },
    /// The session is gone and its nodes have been released.
    Terminated {
        session: SessionId,
        reason: TerminationReason,
    },
}

/// The top-level schedulable entity wrapping one allocation.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    allocation: Allocation,
    job: Option<Job>,
    steps: Vec<Step>,
    next_step: StepId,
    /// Passes in which this session was offered but not advanced.
    pub(crate) attempts: u32,
    pub(crate) provision: ProvisionStatus,
    pub(crate) allocated_at: Option<Instant>,
    /// States this session has been in, oldest first.
    history: Vec<SessionState>,
    notifier: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl Session {
    /// Construct a session in the `Undef` placeholder state.
    pub fn new(
        id: SessionId,
        allocation: Allocation,
        job: Option<Job>,
        notifier: Option<mpsc::UnboundedSender<SessionEvent>>,
    ) -> Self {
        let provision = if allocation.image().is_some() {
            ProvisionStatus::Pending
        } else {
            ProvisionStatus::NotRequired
        };
        Self {
            id,
            state: SessionState::Undef,
            allocation,
            job,
            steps: Vec::new(),
            next_step: 0,
            attempts: 0,
            provision,
            allocated_at: None,
            history: vec![SessionState::Undef],
            notifier,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn provision_status(&self) -> &ProvisionStatus {
        &self.provision
    }

    /// Every state the session has passed through, oldest first.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// All nodes held across all steps.
    pub fn held_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.steps.iter().flat_map(|s| s.nodes.iter().copied())
    }

    pub fn held_node_count(&self) -> usize {
        self.steps.iter().map(|s| s.nodes.len()).sum()
    }

    /// Whether this session waits on the provisioning collaborator.
    pub fn awaiting_provision(&self) -> bool {
        self.provision == ProvisionStatus::Requested
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        debug!(
            session = self.id,
            from = %self.state,
            to = %state,
            "session state change"
        );
        self.state = state;
        self.history.push(state);
    }

    /// Open a new, empty step. Only the registry links nodes into it.
    pub(crate) fn open_step(&mut self) -> &mut Step {
        let id = self.next_step;
        self.next_step += 1;
        let job = self.job.as_ref().map(|j| j.id);
        self.steps.push(Step::new(id, job));
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    /// Drop steps that hold no nodes (e.g. after release).
    pub(crate) fn prune_empty_steps(&mut self) {
        self.steps.retain(|s| !s.nodes.is_empty());
    }

    pub(crate) fn notify(&self, event: SessionEvent) {
        if let Some(tx) = &self.notifier {
            if tx.send(event).is_err() {
                debug!(session = self.id, "submitter dropped its session receiver");
            }
        }
    }
}
