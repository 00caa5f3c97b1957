// src/engine/core.rs

//! Pure scheduler core.
//!
//! [`SchedulerCore`] owns every piece of scheduler state:
//! - the queues and the sessions linked into them
//! - the set of allocated sessions
//! - the node registry
//! - the policy chain
//!
//! It is synchronous and deterministic. Work that has to leave the core
//! (provisioning requests, history writes) is returned as [`CoreCommand`]s
//! for the IO shell (`engine::runtime::EventEngine`) to carry out, so the
//! core can be driven directly from tests without a thread or a runtime.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collab::{HistoryRecord, HistoryStore, NullHistoryStore, NullProvisioner, Provisioner};
use crate::config::ConfigFile;
use crate::engine::EngineEvent;
use crate::engine::admission::Admission;
use crate::engine::event_handlers::{CoreCommand, CoreStep};
use crate::errors::{Result, SchedulerError};
use crate::model::{Allocation, Job, Queue, Session, SessionEvent};
use crate::policy::{ChainOutcome, ClaimContext, FirstFitPolicy, PolicyChain, PolicyModule};
use crate::registry::{NodeRegistry, Resource};
use crate::types::{NodeIndex, SessionId, SessionState, TerminationReason};

/// Record set every terminated session is written to.
pub const HISTORY_RECORD_SET: &str = "sessions";

/// Tunables taken from the `[scheduler]` and `[telemetry]` sections.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreOptions {
    pub tick_interval: Duration,
    /// 0 = unbounded.
    pub max_schedule_attempts: u32,
    pub telemetry_limits: BTreeMap<String, f64>,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            max_schedule_attempts: 0,
            telemetry_limits: BTreeMap::new(),
        }
    }
}

pub struct SchedulerCore {
    /// In declaration order.
    pub(crate) queues: Vec<Queue>,
    pub(crate) allocated: BTreeMap<SessionId, Session>,
    pub(crate) registry: NodeRegistry,
    pub(crate) chain: PolicyChain,
    pub(crate) options: CoreOptions,
    admission: Arc<Admission>,
    provisioner: Arc<dyn Provisioner>,
    history: Arc<dyn HistoryStore>,
}

impl std::fmt::Debug for SchedulerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerCore")
            .field("queues", &self.queues)
            .field("allocated", &self.allocated.keys().collect::<Vec<_>>())
            .field("registry", &self.registry)
            .field("chain", &self.chain)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SchedulerCore {
    /// Empty core: no queues, no nodes, no policy modules.
    pub fn new(options: CoreOptions) -> Self {
        Self {
            queues: Vec::new(),
            allocated: BTreeMap::new(),
            registry: NodeRegistry::new(),
            chain: PolicyChain::new(),
            options,
            admission: Arc::new(Admission::default()),
            provisioner: Arc::new(NullProvisioner),
            history: Arc::new(NullHistoryStore),
        }
    }

    /// Build a core from a validated configuration: queues, nodes, and the
    /// built-in first-fit policy at the configured priority.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let options = CoreOptions {
            tick_interval: cfg.scheduler.tick_interval(),
            max_schedule_attempts: cfg.scheduler.max_schedule_attempts,
            telemetry_limits: cfg.telemetry.limits.clone(),
        };
        let mut core = Self::new(options);

        for q in &cfg.queue {
            core.add_queue(q.name.clone(), q.priority)?;
        }
        for n in &cfg.node {
            core.register_node(n.name.clone(), n.slots, n.resources.clone(), n.online)?;
        }
        core.register_policy(Box::new(FirstFitPolicy::new()), cfg.scheduler.first_fit_priority)?;

        info!(
            queues = core.queues.len(),
            nodes = core.registry.capacity(),
            "scheduler core built from configuration"
        );
        Ok(core)
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_history_store(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn add_queue(&mut self, name: impl Into<String>, priority: i32) -> Result<()> {
        let name = name.into();
        if self.queues.iter().any(|q| q.name() == name) {
            return Err(SchedulerError::ConfigError(format!(
                "duplicate queue name '{name}'"
            )));
        }
        let order = self.queues.len();
        debug!(queue = %name, priority, "adding queue");
        self.admission.add_queue(&name);
        self.queues.push(Queue::new(name, priority, order));
        Ok(())
    }

    pub fn register_policy(&mut self, module: Box<dyn PolicyModule>, priority: i32) -> Result<()> {
        self.chain.register(module, priority)?;
        Ok(())
    }

    pub fn register_node(
        &mut self,
        name: impl Into<String>,
        slots: u32,
        resources: Vec<String>,
        online: bool,
    ) -> Result<NodeIndex> {
        let name = name.into();
        let resources = resources.into_iter().map(Resource::new).collect();
        let index = self.registry.register(name.clone(), slots, resources)?;
        if online {
            self.registry.set_online(&name)?;
        }
        Ok(index)
    }

    pub fn options(&self) -> &CoreOptions {
        &self.options
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn chain(&self) -> &PolicyChain {
        &self.chain
    }

    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|q| q.name().to_string()).collect()
    }

    pub fn allocated_sessions(&self) -> impl Iterator<Item = &Session> {
        self.allocated.values()
    }

    /// Live session by id, wherever it currently sits.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.queues
            .iter()
            .find_map(|q| q.get(id))
            .or_else(|| self.allocated.get(&id))
    }

    pub fn session_state(&self, id: SessionId) -> Option<SessionState> {
        self.session(id).map(Session::state)
    }

    pub fn live_sessions(&self) -> usize {
        self.queues.iter().map(Queue::len).sum::<usize>() + self.allocated.len()
    }

    pub(crate) fn admission(&self) -> Arc<Admission> {
        Arc::clone(&self.admission)
    }

    pub(crate) fn provisioner(&self) -> Arc<dyn Provisioner> {
        Arc::clone(&self.provisioner)
    }

    pub(crate) fn history_store(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.history)
    }

    /// Index of the queue `name` refers to; `None` selects the first queue.
    pub(crate) fn queue_index(&self, name: Option<&str>) -> Option<usize> {
        match name {
            None => (!self.queues.is_empty()).then_some(0),
            Some(name) => self.queues.iter().position(|q| q.name() == name),
        }
    }

    /// Validate and enqueue an allocation without going through the engine
    /// thread. Returns the new session id and its notification receiver.
    ///
    /// Meant for a core no engine is running. Called from posted work while
    /// handles are submitting, the new session may be queued ahead of lower
    /// ids still in the engine channel.
    pub fn submit(
        &mut self,
        mut allocation: Allocation,
        job: Option<Job>,
    ) -> Result<(SessionId, mpsc::UnboundedReceiver<SessionEvent>)> {
        allocation.resolve_nodefile()?;
        allocation.validate()?;
        if self.queue_index(allocation.queue.as_deref()).is_none() {
            return Err(SchedulerError::UnknownQueue(
                allocation.queue.unwrap_or_default(),
            ));
        }
        let admission = Arc::clone(&self.admission);
        admission.issue(|id| {
            let (tx, rx) = mpsc::unbounded_channel();
            self.handle_submit(id, allocation, job, tx).map(|()| (id, rx))
        })
    }

    /// Handle a single engine event. `Work` closures are run here too.
    pub fn step(&mut self, event: EngineEvent) -> CoreStep {
        let mut commands = Vec::new();
        match event {
            EngineEvent::Submit {
                session,
                allocation,
                job,
                notifier,
            } => {
                if let Err(e) = self.handle_submit(session, allocation, job, notifier.clone()) {
                    warn!(session, error = %e, "rejecting submitted session");
                    let _ = notifier.send(SessionEvent::Terminated {
                        session,
                        reason: TerminationReason::Cancelled,
                    });
                }
            }
            EngineEvent::Cancel { session } => self.handle_cancel(session, &mut commands),
            EngineEvent::Complete { session } => self.handle_complete(session, &mut commands),
            EngineEvent::RegisterNode {
                name,
                slots,
                resources,
                online,
            } => {
                if let Err(e) = self.register_node(name.clone(), slots, resources, online) {
                    warn!(node = %name, error = %e, "node registration failed");
                }
            }
            EngineEvent::Telemetry { records } => {
                self.registry
                    .apply_telemetry(&records, &self.options.telemetry_limits);
            }
            EngineEvent::ProvisionCompleted { session, result } => {
                self.handle_provision_completed(session, result, &mut commands)
            }
            EngineEvent::HistoryStored { record_set, result } => match result {
                Ok(()) => debug!(%record_set, "history record stored"),
                Err(e) => warn!(%record_set, error = %e, "history store failed"),
            },
            EngineEvent::Work(work) => work(self),
            EngineEvent::Shutdown => {
                return CoreStep {
                    commands,
                    keep_running: false,
                };
            }
        }
        CoreStep {
            commands,
            keep_running: true,
        }
    }

    /// The single entry point for session state transitions.
    ///
    /// - Illegal transitions return `IllegalTransition` and change nothing.
    /// - `Schedule` and `Allocd` happen only if a policy module claims them;
    ///   `Ok(false)` means nobody did.
    /// - `Init` and `Terminated` always happen once legal. Entering
    ///   `Terminated` releases every node the session holds.
    pub fn activate_session_state(
        &mut self,
        session: &mut Session,
        target: SessionState,
    ) -> Result<bool> {
        self.activate_at(session, target, SystemTime::now())
    }

    pub(crate) fn activate_at(
        &mut self,
        session: &mut Session,
        target: SessionState,
        now: SystemTime,
    ) -> Result<bool> {
        if !self.consult_chain(session, target, now)? {
            return Ok(false);
        }
        self.enter_state(session, target);
        Ok(true)
    }

    /// Legality check plus chain dispatch, without the state change itself.
    ///
    /// Returns whether the transition may go ahead.
    pub(crate) fn consult_chain(
        &mut self,
        session: &mut Session,
        target: SessionState,
        now: SystemTime,
    ) -> Result<bool> {
        let from = session.state();
        if !from.can_transition_to(target) {
            return Err(SchedulerError::IllegalTransition {
                session: session.id(),
                from,
                to: target,
            });
        }

        let mut ctx = ClaimContext {
            registry: &mut self.registry,
            now,
        };
        let outcome = self.chain.dispatch(session, target, &mut ctx);

        match (target, outcome) {
            (SessionState::Init | SessionState::Terminated, _) => Ok(true),
            (_, ChainOutcome::Claimed { .. }) => Ok(true),
            (_, ChainOutcome::Unclaimed) => {
                debug!(
                    session = session.id(),
                    state = %target,
                    "no policy module claimed transition"
                );
                Ok(false)
            }
        }
    }

    /// Apply an already-approved transition.
    pub(crate) fn enter_state(&mut self, session: &mut Session, target: SessionState) {
        if target == SessionState::Terminated {
            self.registry.release_session(session);
        }
        session.set_state(target);
    }

    /// Terminate a detached session: release, notify, record.
    pub(crate) fn terminate(
        &mut self,
        mut session: Session,
        reason: TerminationReason,
        commands: &mut Vec<CoreCommand>,
    ) {
        let held: Vec<NodeIndex> = session.held_nodes().collect();
        let nodes = self.registry.names_of(&held);

        if let Err(e) = self.activate_session_state(&mut session, SessionState::Terminated) {
            warn!(session = session.id(), error = %e, "session already terminated");
            return;
        }

        info!(
            session = session.id(),
            reason = %reason,
            released = nodes.len(),
            "session terminated"
        );
        session.notify(SessionEvent::Terminated {
            session: session.id(),
            reason: reason.clone(),
        });
        commands.push(CoreCommand::StoreHistory {
            record_set: HISTORY_RECORD_SET.to_string(),
            records: vec![history_record(&session, &nodes, &reason)],
        });
    }

    /// Orderly teardown: every live session is terminated with `Shutdown`
    /// (queued ones first), then the policy chain is finalized and the
    /// registry emptied.
    pub fn teardown(&mut self) -> Vec<CoreCommand> {
        let mut commands = Vec::new();

        let queued: Vec<Session> = self
            .queues
            .iter_mut()
            .flat_map(|q| q.drain().collect::<Vec<_>>())
            .collect();
        let allocated: Vec<Session> = std::mem::take(&mut self.allocated).into_values().collect();

        info!(
            queued = queued.len(),
            allocated = allocated.len(),
            "tearing down scheduler core"
        );

        for session in queued.into_iter().chain(allocated) {
            self.terminate(session, TerminationReason::Shutdown, &mut commands);
        }
        self.queues.clear();
        self.admission.clear_queues();
        self.chain.teardown();
        self.registry.clear();
        commands
    }
}

fn history_record(
    session: &Session,
    nodes: &[String],
    reason: &TerminationReason,
) -> HistoryRecord {
    let alloc = session.allocation();
    let states = session
        .history()
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(">");

    let mut fields = vec![
        ("session".to_string(), session.id().to_string()),
        ("queue".to_string(), alloc.queue.clone().unwrap_or_default()),
        ("states".to_string(), states),
        ("nodes".to_string(), nodes.join(",")),
        ("attempts".to_string(), session.attempts().to_string()),
        ("reason".to_string(), reason.to_string()),
    ];
    if let Some(account) = &alloc.account {
        fields.push(("account".to_string(), account.clone()));
    }
    if let Some(name) = &alloc.name {
        fields.push(("name".to_string(), name.clone()));
    }
    if let Some(job) = session.job() {
        fields.push(("job".to_string(), job.id.to_string()));
    }
    HistoryRecord { fields }
}
