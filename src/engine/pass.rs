// src/engine/pass.rs

//! The scheduling pass run once per engine wake.

use std::cmp::Reverse;
use std::time::{Instant, SystemTime};

use tracing::{debug, error, trace, warn};

use crate::engine::core::SchedulerCore;
use crate::engine::event_handlers::CoreCommand;
use crate::errors::Result;
use crate::model::{ProvisionStatus, Session};
use crate::types::{SessionId, SessionState, TerminationReason};

/// What happened during one pass.
#[derive(Debug, Default, Clone)]
pub struct PassReport {
    /// Queue heads offered to the policy chain, in visiting order.
    pub offered: Vec<SessionId>,
    pub allocated: Vec<SessionId>,
    pub terminated: Vec<SessionId>,
    /// Work for the IO shell.
    pub commands: Vec<CoreCommand>,
}

impl PassReport {
    pub fn is_empty(&self) -> bool {
        self.offered.is_empty()
            && self.allocated.is_empty()
            && self.terminated.is_empty()
            && self.commands.is_empty()
    }
}

/// Result of offering one head session.
enum Offer {
    Allocated,
    ProvisionRequested,
    /// Moved to `Schedule` but not further. Not counted as an attempt.
    Scheduled,
    Stalled,
}

impl SchedulerCore {
    /// Queue indices in visiting order: descending priority, then
    /// declaration order.
    pub fn dispatch_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.queues.len()).collect();
        order.sort_by_key(|&i| (Reverse(self.queues[i].priority()), self.queues[i].order()));
        order
    }

    pub fn run_pass(&mut self) -> PassReport {
        self.run_pass_at(SystemTime::now(), Instant::now())
    }

    /// One scheduling pass against explicit clocks.
    ///
    /// `now` is handed to policy modules (begin times); `clock` drives
    /// walltime accounting.
    pub fn run_pass_at(&mut self, now: SystemTime, clock: Instant) -> PassReport {
        let mut report = PassReport::default();

        for qi in self.dispatch_order() {
            let Some(head) = self.queues[qi].head() else {
                continue;
            };
            if head.awaiting_provision() {
                trace!(
                    session = head.id(),
                    queue = %self.queues[qi].name(),
                    "head waiting for provisioning"
                );
                continue;
            }
            let Some(mut session) = self.queues[qi].pop_head() else {
                continue;
            };
            let id = session.id();
            report.offered.push(id);

            match self.offer(&mut session, now) {
                Ok(Offer::Allocated) => {
                    self.admit(session, clock);
                    report.allocated.push(id);
                }
                Ok(Offer::ProvisionRequested) => {
                    report
                        .commands
                        .push(CoreCommand::Provision(self.provision_request(&session)));
                    self.queues[qi].requeue_head(session);
                }
                Ok(Offer::Scheduled) => self.queues[qi].requeue_head(session),
                Ok(Offer::Stalled) => {
                    session.attempts += 1;
                    let limit = self.options.max_schedule_attempts;
                    if limit > 0 && session.attempts >= limit {
                        warn!(
                            session = id,
                            queue = %self.queues[qi].name(),
                            attempts = session.attempts,
                            "session starved"
                        );
                        let attempts = session.attempts;
                        self.terminate(
                            session,
                            TerminationReason::Starved { attempts },
                            &mut report.commands,
                        );
                        report.terminated.push(id);
                    } else {
                        self.queues[qi].requeue_head(session);
                    }
                }
                Err(e) => {
                    error!(session = id, error = %e, "failed to advance session");
                    self.queues[qi].requeue_head(session);
                }
            }
        }

        self.expire_walltimes(clock, &mut report);

        if !report.is_empty() {
            debug!(
                offered = report.offered.len(),
                allocated = report.allocated.len(),
                terminated = report.terminated.len(),
                "scheduling pass finished"
            );
        }
        report
    }

    /// Drive a head session as far as the chain lets it go in one pass.
    ///
    /// Only a pass in which the session does not change state at all counts
    /// against `max_schedule_attempts`.
    fn offer(&mut self, session: &mut Session, now: SystemTime) -> Result<Offer> {
        let mut scheduled = false;
        if session.state() == SessionState::Init {
            if !self.activate_at(session, SessionState::Schedule, now)? {
                return Ok(Offer::Stalled);
            }
            scheduled = true;
        }

        if !self.consult_chain(session, SessionState::Allocd, now)? {
            return Ok(if scheduled { Offer::Scheduled } else { Offer::Stalled });
        }

        if session.provision == ProvisionStatus::Pending {
            session.provision = ProvisionStatus::Requested;
            debug!(
                session = session.id(),
                image = session.allocation().image().unwrap_or_default(),
                "nodes committed; waiting for provisioning"
            );
            return Ok(Offer::ProvisionRequested);
        }

        self.enter_state(session, SessionState::Allocd);
        Ok(Offer::Allocated)
    }

    /// Terminate allocated sessions whose walltime has elapsed.
    fn expire_walltimes(&mut self, clock: Instant, report: &mut PassReport) {
        let expired: Vec<SessionId> = self
            .allocated
            .values()
            .filter(|s| {
                match (s.allocated_at, s.allocation().walltime) {
                    (Some(at), Some(walltime)) => clock.saturating_duration_since(at) >= walltime,
                    _ => false,
                }
            })
            .map(Session::id)
            .collect();

        for id in expired {
            if let Some(session) = self.allocated.remove(&id) {
                self.terminate(session, TerminationReason::WalltimeExpired, &mut report.commands);
                report.terminated.push(id);
            }
        }
    }
}
