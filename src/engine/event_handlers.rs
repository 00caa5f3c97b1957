// src/engine/event_handlers.rs

//! Event handling logic for the scheduler core.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collab::{CollaboratorError, HistoryRecord, ProvisionRequest};
use crate::engine::core::SchedulerCore;
use crate::errors::{Result, SchedulerError};
use crate::model::{Allocation, Job, ProvisionStatus, Session, SessionEvent};
use crate::types::{NodeIndex, SessionId, SessionState, TerminationReason};

/// Command produced by the pure core, to be executed by the IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Hand this request to the provisioning collaborator.
    Provision(ProvisionRequest),
    /// Write these records to the history store.
    StoreHistory {
        record_set: String,
        records: Vec<HistoryRecord>,
    },
}

/// Decision returned by the core after handling a single `EngineEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the engine loop should keep running.
    pub keep_running: bool,
}

impl SchedulerCore {
    /// Create the session in `Undef`, move it to `Init` and link it at the
    /// tail of its queue.
    pub(crate) fn handle_submit(
        &mut self,
        id: SessionId,
        mut allocation: Allocation,
        job: Option<Job>,
        notifier: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<()> {
        let qi = self
            .queue_index(allocation.queue.as_deref())
            .ok_or_else(|| {
                SchedulerError::UnknownQueue(allocation.queue.clone().unwrap_or_default())
            })?;
        allocation.queue = Some(self.queues[qi].name().to_string());

        let mut session = Session::new(id, allocation, job, Some(notifier));
        self.activate_session_state(&mut session, SessionState::Init)?;

        info!(
            session = id,
            queue = %self.queues[qi].name(),
            min_nodes = session.allocation().min_nodes,
            max_nodes = session.allocation().max_nodes,
            "session queued"
        );
        self.queues[qi].push(session);
        Ok(())
    }

    /// Forced termination. Works on queued and allocated sessions alike, and
    /// on sessions waiting for provisioning.
    pub(crate) fn handle_cancel(&mut self, id: SessionId, commands: &mut Vec<CoreCommand>) {
        let Some(session) = self.detach(id) else {
            debug!(session = id, "cancel for unknown session; ignoring");
            return;
        };
        self.terminate(session, TerminationReason::Cancelled, commands);
    }

    /// Normal termination. Only allocated sessions can complete.
    pub(crate) fn handle_complete(&mut self, id: SessionId, commands: &mut Vec<CoreCommand>) {
        match self.allocated.remove(&id) {
            Some(session) => self.terminate(session, TerminationReason::Completed, commands),
            None if self.session(id).is_some() => {
                warn!(session = id, "completion for a session that is not allocated; ignoring");
            }
            None => debug!(session = id, "completion for unknown session; ignoring"),
        }
    }

    pub(crate) fn handle_provision_completed(
        &mut self,
        id: SessionId,
        result: std::result::Result<(), CollaboratorError>,
        commands: &mut Vec<CoreCommand>,
    ) {
        let Some(qi) = self.locate_queued(id) else {
            debug!(session = id, "provisioning finished for a session that is gone");
            return;
        };
        if !self.queues[qi].get(id).is_some_and(Session::awaiting_provision) {
            warn!(session = id, "unexpected provisioning completion; ignoring");
            return;
        }
        let Some(mut session) = self.queues[qi].remove(id) else {
            return;
        };

        match result {
            Ok(()) => {
                info!(session = id, "provisioning succeeded");
                session.provision = ProvisionStatus::Completed;
                self.enter_state(&mut session, SessionState::Allocd);
                self.admit(session, Instant::now());
            }
            Err(e) => {
                warn!(session = id, error = %e, "provisioning failed");
                self.terminate(session, TerminationReason::ProvisionFailed(e.0), commands);
            }
        }
    }

    /// Link an `Allocd` session into the allocated set and tell its owner.
    pub(crate) fn admit(&mut self, mut session: Session, now: Instant) {
        let held: Vec<NodeIndex> = session.held_nodes().collect();
        let nodes = self.registry.names_of(&held);
        session.allocated_at = Some(now);

        info!(session = session.id(), nodes = ?nodes, "session allocated");
        session.notify(SessionEvent::Allocated {
            session: session.id(),
            nodes,
        });
        self.allocated.insert(session.id(), session);
    }

    /// Build the provisioning request for a session whose nodes were just
    /// committed.
    pub(crate) fn provision_request(&self, session: &Session) -> ProvisionRequest {
        let held: Vec<NodeIndex> = session.held_nodes().collect();
        ProvisionRequest {
            session: session.id(),
            nodes: self.registry.names_of(&held),
            image: session.allocation().image().unwrap_or_default().to_string(),
            attributes: session
                .allocation()
                .resource_constraints()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Unlink a live session from wherever it sits.
    fn detach(&mut self, id: SessionId) -> Option<Session> {
        if let Some(session) = self.allocated.remove(&id) {
            return Some(session);
        }
        self.queues.iter_mut().find_map(|q| q.remove(id))
    }

    fn locate_queued(&self, id: SessionId) -> Option<usize> {
        self.queues.iter().position(|q| q.contains(id))
    }
}
