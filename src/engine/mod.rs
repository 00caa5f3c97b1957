// src/engine/mod.rs

//! Scheduling engine.
//!
//! This module ties together:
//! - the queues, sessions, node registry and policy chain (owned by
//!   [`SchedulerCore`])
//! - the session state machine and the per-wake scheduling pass
//! - the dedicated engine thread that reacts to:
//!   - submissions, cancellations and completions from callers
//!   - telemetry pushes
//!   - collaborator completions
//!   - timer ticks
//!   - shutdown
//!
//! The pure, synchronous core lives in [`core`] (with the event and pass
//! logic in [`event_handlers`] and [`pass`]); the thread/channel shell is
//! implemented in [`runtime`].

use std::fmt;

use tokio::sync::mpsc;

use crate::collab::{CollaboratorError, MetricRecord};
use crate::model::{Allocation, Job, SessionEvent};
use crate::types::SessionId;

/// Unit of work posted to the engine thread.
pub type Work = Box<dyn FnOnce(&mut SchedulerCore) + Send + 'static>;

/// Messages flowing into the engine thread.
pub enum EngineEvent {
    /// A validated allocation to enqueue as a new session.
    Submit {
        session: SessionId,
        allocation: Allocation,
        job: Option<Job>,
        notifier: mpsc::UnboundedSender<SessionEvent>,
    },
    /// Forced termination; wins over any scheduling in progress.
    Cancel { session: SessionId },
    /// Normal termination of an allocated session.
    Complete { session: SessionId },
    /// Add a node to the registry at runtime.
    RegisterNode {
        name: String,
        slots: u32,
        resources: Vec<String>,
        online: bool,
    },
    /// Metric samples from the telemetry side.
    Telemetry { records: Vec<MetricRecord> },
    /// The provisioning collaborator finished a request.
    ProvisionCompleted {
        session: SessionId,
        result: Result<(), CollaboratorError>,
    },
    /// The history store finished a write.
    HistoryStored {
        record_set: String,
        result: Result<(), CollaboratorError>,
    },
    /// Arbitrary work to run against the core.
    Work(Work),
    /// Break the loop.
    Shutdown,
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::Submit {
                session,
                allocation,
                job,
                ..
            } => f
                .debug_struct("Submit")
                .field("session", session)
                .field("allocation", allocation)
                .field("job", job)
                .finish_non_exhaustive(),
            EngineEvent::Cancel { session } => {
                f.debug_struct("Cancel").field("session", session).finish()
            }
            EngineEvent::Complete { session } => {
                f.debug_struct("Complete").field("session", session).finish()
            }
            EngineEvent::RegisterNode {
                name,
                slots,
                resources,
                online,
            } => f
                .debug_struct("RegisterNode")
                .field("name", name)
                .field("slots", slots)
                .field("resources", resources)
                .field("online", online)
                .finish(),
            EngineEvent::Telemetry { records } => f
                .debug_struct("Telemetry")
                .field("records", &records.len())
                .finish(),
            EngineEvent::ProvisionCompleted { session, result } => f
                .debug_struct("ProvisionCompleted")
                .field("session", session)
                .field("result", result)
                .finish(),
            EngineEvent::HistoryStored { record_set, result } => f
                .debug_struct("HistoryStored")
                .field("record_set", record_set)
                .field("result", result)
                .finish(),
            EngineEvent::Work(_) => f.write_str("Work(..)"),
            EngineEvent::Shutdown => f.write_str("Shutdown"),
        }
    }
}

mod admission;
pub mod core;
pub mod event_handlers;
pub mod pass;
pub mod runtime;

pub use self::core::{CoreOptions, HISTORY_RECORD_SET, SchedulerCore};
pub use event_handlers::{CoreCommand, CoreStep};
pub use pass::PassReport;
pub use runtime::{EventEngine, SchedulerHandle, SessionTicket};
