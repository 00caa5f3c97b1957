use std::sync::{Arc, Mutex};

use clustersched::errors::PolicyError;
use clustersched::model::Session;
use clustersched::policy::{Claim, ClaimContext, PolicyModule};
use clustersched::types::{SessionId, SessionState};

/// How a [`RecordingPolicy`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Decline,
    ClaimAll,
    /// Claim only this target state.
    ClaimOnly(SessionState),
    Fail,
    /// Commit the first free node to the session, then panic.
    PanicAfterCommit,
    FailInit,
}

/// One offer observed by a [`RecordingPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub module: String,
    pub session: SessionId,
    pub target: SessionState,
}

pub type OfferLog = Arc<Mutex<Vec<Offer>>>;

/// A policy module that writes every offer into a shared log.
pub struct RecordingPolicy {
    name: String,
    behaviour: Behaviour,
    log: OfferLog,
    finalized: Arc<Mutex<bool>>,
}

impl RecordingPolicy {
    pub fn new(name: &str, behaviour: Behaviour, log: OfferLog) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            log,
            finalized: Arc::new(Mutex::new(false)),
        }
    }

    /// Flag flipped when the chain finalizes this module.
    pub fn finalized_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.finalized)
    }
}

pub fn offer_log() -> OfferLog {
    Arc::new(Mutex::new(Vec::new()))
}

impl PolicyModule for RecordingPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> Result<(), PolicyError> {
        if self.behaviour == Behaviour::FailInit {
            return Err(PolicyError::Init {
                module: self.name.clone(),
                reason: "refusing to start".to_string(),
            });
        }
        Ok(())
    }

    fn finalize(&mut self) {
        *self.finalized.lock().unwrap() = true;
    }

    fn try_claim(
        &mut self,
        session: &mut Session,
        target: SessionState,
        ctx: &mut ClaimContext<'_>,
    ) -> Result<Claim, PolicyError> {
        self.log.lock().unwrap().push(Offer {
            module: self.name.clone(),
            session: session.id(),
            target,
        });

        match self.behaviour {
            Behaviour::Decline | Behaviour::FailInit => Ok(Claim::Declined),
            Behaviour::ClaimAll => Ok(Claim::Claimed),
            Behaviour::ClaimOnly(state) if state == target => Ok(Claim::Claimed),
            Behaviour::ClaimOnly(_) => Ok(Claim::Declined),
            Behaviour::Fail => Err(PolicyError::Claim {
                module: self.name.clone(),
                session: session.id(),
                reason: "synthetic failure".to_string(),
            }),
            Behaviour::PanicAfterCommit => {
                if target == SessionState::Allocd {
                    if let Some(free) = ctx.registry.find_candidates(session.allocation()) {
                        let _ = ctx.registry.commit_step(session, &free);
                    }
                    panic!("module {} blew up", self.name);
                }
                Ok(Claim::Declined)
            }
        }
    }
}
