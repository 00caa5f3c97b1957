// src/policy/mod.rs

//! Pluggable scheduling policies.
//!
//! A [`PolicyModule`] is offered sessions together with the state the core
//! wants to move them to. Modules are held in a [`PolicyChain`] ordered by
//! ascending priority value (lower value = asked earlier; ties go to the
//! module registered first). The first module that returns
//! [`Claim::Claimed`] wins; the rest are not asked.

pub mod first_fit;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::SystemTime;

use tracing::{debug, error, info, warn};

use crate::errors::PolicyError;
use crate::model::Session;
use crate::registry::NodeRegistry;
use crate::types::SessionState;

pub use first_fit::FirstFitPolicy;

/// Answer of a module for one session/state pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The module took responsibility; the transition goes ahead.
    Claimed,
    /// Not this module's business; ask the next one.
    Declined,
}

/// What a module may touch while deciding.
pub struct ClaimContext<'a> {
    pub registry: &'a mut NodeRegistry,
    /// Wall-clock time of the current pass.
    pub now: SystemTime,
}

/// A scheduling policy.
///
/// Implementations run on the engine thread and must not block.
pub trait PolicyModule: Send {
    fn name(&self) -> &str;

    /// Called once on registration. An error keeps the module out of the
    /// chain.
    fn init(&mut self) -> Result<(), PolicyError> {
        Ok(())
    }

    /// Called once on orderly teardown.
    fn finalize(&mut self) {}

    /// Decide whether to claim moving `session` to `target`.
    ///
    /// A module claiming `Allocd` is expected to have committed nodes for the
    /// session through `ctx.registry`.
    fn try_claim(
        &mut self,
        session: &mut Session,
        target: SessionState,
        ctx: &mut ClaimContext<'_>,
    ) -> Result<Claim, PolicyError>;
}

/// One registered module plus its ordering keys.
pub struct ActiveModule {
    module: Box<dyn PolicyModule>,
    priority: i32,
    seq: u64,
}

impl ActiveModule {
    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Result of offering a transition to the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Claimed { module: String },
    Unclaimed,
}

/// Priority-ordered list of active modules.
#[derive(Default)]
pub struct PolicyChain {
    entries: Vec<ActiveModule>,
    next_seq: u64,
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.name(), e.priority)))
            .finish()
    }
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialise `module` and insert it at its priority position.
    pub fn register(
        &mut self,
        mut module: Box<dyn PolicyModule>,
        priority: i32,
    ) -> Result<(), PolicyError> {
        module.init()?;

        let seq = self.next_seq;
        self.next_seq += 1;
        info!(module = %module.name(), priority, "policy module registered");

        let pos = self
            .entries
            .iter()
            .position(|e| (e.priority, e.seq) > (priority, seq))
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            ActiveModule {
                module,
                priority,
                seq,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Module names in the order they are asked.
    pub fn module_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    /// Offer `session -> target` to each module in order until one claims.
    ///
    /// - An `Err` is logged and the next module is asked.
    /// - A panic unregisters the module (without `finalize`); any steps the
    ///   session gained during that call are released.
    pub fn dispatch(
        &mut self,
        session: &mut Session,
        target: SessionState,
        ctx: &mut ClaimContext<'_>,
    ) -> ChainOutcome {
        let mut i = 0;
        while i < self.entries.len() {
            let steps_before = session.steps().len();
            let entry = &mut self.entries[i];

            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                entry.module.try_claim(session, target, ctx)
            }));

            match result {
                Ok(Ok(Claim::Claimed)) => {
                    debug!(
                        session = session.id(),
                        module = %entry.name(),
                        state = %target,
                        "module claimed session"
                    );
                    return ChainOutcome::Claimed {
                        module: entry.name().to_string(),
                    };
                }
                Ok(Ok(Claim::Declined)) => {
                    i += 1;
                }
                Ok(Err(err)) => {
                    warn!(
                        session = session.id(),
                        module = %entry.name(),
                        state = %target,
                        error = %err,
                        "policy module failed; skipping for this attempt"
                    );
                    i += 1;
                }
                Err(payload) => {
                    let removed = self.entries.remove(i);
                    error!(
                        session = session.id(),
                        module = %removed.name(),
                        state = %target,
                        panic = %panic_message(payload.as_ref()),
                        "policy module panicked; unregistering it"
                    );
                    let id = session.id();
                    for step in session.steps_mut().iter_mut().skip(steps_before) {
                        ctx.registry.release_step(id, step);
                    }
                    session.prune_empty_steps();
                }
            }
        }
        ChainOutcome::Unclaimed
    }

    /// Finalize every module in chain order and empty the chain.
    pub fn teardown(&mut self) {
        for mut entry in self.entries.drain(..) {
            debug!(module = %entry.name(), "finalizing policy module");
            entry.module.finalize();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
