// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::collab::{HistoryStore, MetricRecord, Provisioner};
use crate::errors::{Result, SchedulerError};
use crate::model::{Allocation, Job, SessionEvent};
use crate::types::SessionId;

use super::admission::Admission;
use super::core::SchedulerCore;
use super::{CoreCommand, EngineEvent};

const ENGINE_THREAD_NAME: &str = "clustersched-engine";

/// Owns the dedicated scheduler thread.
///
/// The thread runs a current-thread tokio runtime whose single task waits on
/// the engine channel and a tick timer. Each wake applies every queued event
/// to the [`SchedulerCore`] and then runs one scheduling pass. Commands the
/// core returns are carried out here, with collaborator callbacks posting
/// their completions back through the channel.
pub struct EventEngine {
    handle: SchedulerHandle,
    thread: Option<JoinHandle<SchedulerCore>>,
}

impl fmt::Debug for EventEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEngine")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl EventEngine {
    /// Move `core` onto a new engine thread and start the loop.
    pub fn start(core: SchedulerCore) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| SchedulerError::EngineStart(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));
        let handle = SchedulerHandle {
            event_tx: event_tx.clone(),
            admission: core.admission(),
            active: Arc::clone(&active),
        };
        let tick = core.options().tick_interval;

        let shell = Shell {
            core,
            event_rx,
            event_tx,
            active,
        };
        let thread = std::thread::Builder::new()
            .name(ENGINE_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(shell.loop_until_stopped(tick)))
            .map_err(|e| SchedulerError::EngineStart(e.to_string()))?;

        info!(tick_ms = tick.as_millis() as u64, "event engine started");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.active.load(Ordering::Acquire)
    }

    /// Schedule `work` to run on the engine thread. Never blocks.
    pub fn post<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&mut SchedulerCore) + Send + 'static,
    {
        self.handle.post(work)
    }

    /// Stop the loop, join the thread and tear the core down.
    ///
    /// Idempotent; later calls are no-ops.
    pub fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.handle.active.store(false, Ordering::Release);
        if self.handle.event_tx.send(EngineEvent::Shutdown).is_err() {
            debug!("engine loop already gone");
        }

        let mut core = thread.join().map_err(|_| {
            error!("engine thread panicked");
            SchedulerError::EngineStopped
        })?;

        let provisioner = core.provisioner();
        let history = core.history_store();
        for command in core.teardown() {
            execute_detached(command, provisioner.as_ref(), history.as_ref());
        }
        info!("event engine stopped");
        Ok(())
    }
}

impl Drop for EventEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "event engine did not stop cleanly");
        }
    }
}

/// The state moved onto the engine thread.
struct Shell {
    core: SchedulerCore,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    /// For collaborator callbacks.
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    active: Arc<AtomicBool>,
}

impl Shell {
    async fn loop_until_stopped(mut self, tick: Duration) -> SchedulerCore {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("scheduler loop running");

        loop {
            let keep_running = tokio::select! {
                received = self.event_rx.recv() => match received {
                    Some(event) => self.apply_pending(event),
                    None => {
                        info!("engine channel closed; exiting");
                        false
                    }
                },
                _ = ticker.tick() => {
                    trace!("timer wake");
                    true
                }
            };

            if !keep_running || !self.active.load(Ordering::Acquire) {
                break;
            }

            let report = self.core.run_pass();
            for command in report.commands {
                self.execute(command);
            }
        }

        info!("scheduler loop exiting");
        self.core
    }

    /// Apply `first` and everything already queued behind it.
    fn apply_pending(&mut self, first: EngineEvent) -> bool {
        let mut next = Some(first);
        while let Some(event) = next {
            debug!(?event, "engine received event");
            let step = self.core.step(event);
            for command in step.commands {
                self.execute(command);
            }
            if !step.keep_running {
                info!("shutdown requested");
                return false;
            }
            next = self.event_rx.try_recv().ok();
        }
        true
    }

    fn execute(&self, command: CoreCommand) {
        match command {
            CoreCommand::Provision(request) => {
                let session = request.session;
                let tx = self.event_tx.clone();
                debug!(
                    session,
                    image = %request.image,
                    nodes = ?request.nodes,
                    "requesting provisioning"
                );
                self.core.provisioner().provision(
                    request,
                    Box::new(move |result| {
                        if tx
                            .send(EngineEvent::ProvisionCompleted { session, result })
                            .is_err()
                        {
                            debug!(session, "provisioning finished after engine stop");
                        }
                    }),
                );
            }
            CoreCommand::StoreHistory {
                record_set,
                records,
            } => {
                let tx = self.event_tx.clone();
                let set = record_set.clone();
                self.core.history_store().store(
                    &record_set,
                    records,
                    Box::new(move |result| {
                        let _ = tx.send(EngineEvent::HistoryStored {
                            record_set: set,
                            result,
                        });
                    }),
                );
            }
        }
    }
}

/// Run a command with nobody left to receive its completion.
fn execute_detached(
    command: CoreCommand,
    provisioner: &dyn Provisioner,
    history: &dyn HistoryStore,
) {
    match command {
        CoreCommand::Provision(request) => {
            let session = request.session;
            provisioner.provision(
                request,
                Box::new(move |result| {
                    debug!(session, ?result, "provisioning finished after stop")
                }),
            );
        }
        CoreCommand::StoreHistory {
            record_set,
            records,
        } => {
            let set = record_set.clone();
            history.store(
                &record_set,
                records,
                Box::new(move |result| match result {
                    Ok(()) => debug!(record_set = %set, "history record stored"),
                    Err(e) => warn!(record_set = %set, error = %e, "history store failed"),
                }),
            );
        }
    }
}

/// Cloneable, thread-safe entry point into a running engine.
#[derive(Clone)]
pub struct SchedulerHandle {
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    admission: Arc<Admission>,
    active: Arc<AtomicBool>,
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("queues", &self.admission.queue_names())
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SchedulerHandle {
    /// Validate `allocation` and queue it as a new session.
    ///
    /// Validation runs on the caller's thread; failures are returned here
    /// and nothing is queued. Queues added on the engine thread after start
    /// are accepted too.
    pub fn submit(&self, allocation: Allocation) -> Result<SessionTicket> {
        self.submit_job(allocation, None)
    }

    pub fn submit_job(
        &self,
        mut allocation: Allocation,
        job: Option<Job>,
    ) -> Result<SessionTicket> {
        allocation.resolve_nodefile()?;
        allocation.validate()?;
        self.admission.check_queue(allocation.queue.as_deref())?;

        let (notifier, events) = mpsc::unbounded_channel();
        // Id and send under one lock: the engine sees submissions in id order.
        let session = self.admission.issue(|session| {
            self.send(EngineEvent::Submit {
                session,
                allocation,
                job,
                notifier,
            })
            .map(|()| session)
        })?;
        debug!(session, "session submitted");
        Ok(SessionTicket { id: session, events })
    }

    pub fn cancel(&self, session: SessionId) -> Result<()> {
        self.send(EngineEvent::Cancel { session })
    }

    pub fn complete(&self, session: SessionId) -> Result<()> {
        self.send(EngineEvent::Complete { session })
    }

    pub fn push_telemetry(&self, records: Vec<MetricRecord>) -> Result<()> {
        self.send(EngineEvent::Telemetry { records })
    }

    pub fn register_node(
        &self,
        name: impl Into<String>,
        slots: u32,
        resources: Vec<String>,
        online: bool,
    ) -> Result<()> {
        self.send(EngineEvent::RegisterNode {
            name: name.into(),
            slots,
            resources,
            online,
        })
    }

    pub fn post<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&mut SchedulerCore) + Send + 'static,
    {
        self.send(EngineEvent::Work(Box::new(work)))
    }

    /// Run `f` on the engine thread and wait for its result.
    pub async fn query<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SchedulerCore) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move |core| {
            let _ = tx.send(f(core));
        })?;
        rx.await.map_err(|_| SchedulerError::EngineStopped)
    }

    /// Blocking variant of [`SchedulerHandle::query`]; must not be called
    /// from inside an async context.
    pub fn query_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SchedulerCore) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move |core| {
            let _ = tx.send(f(core));
        })?;
        rx.blocking_recv().map_err(|_| SchedulerError::EngineStopped)
    }

    fn send(&self, event: EngineEvent) -> Result<()> {
        if !self.active.load(Ordering::Acquire) {
            return Err(SchedulerError::EngineStopped);
        }
        self.event_tx
            .send(event)
            .map_err(|_| SchedulerError::EngineStopped)
    }
}

/// What a submitter gets back: the session id and its notifications.
#[derive(Debug)]
pub struct SessionTicket {
    pub id: SessionId,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionTicket {
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }
}
