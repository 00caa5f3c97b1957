// src/policy/first_fit.rs

use tracing::debug;

use crate::errors::PolicyError;
use crate::model::Session;
use crate::policy::{Claim, ClaimContext, PolicyModule};
use crate::types::SessionState;

/// Default placement policy.
///
/// - `Schedule`: claimed once the allocation's begin time has passed.
/// - `Allocd`: claimed when [`NodeRegistry::find_candidates`] finds a node
///   set; the nodes are committed to a fresh step in the same call.
/// - `Init` / `Terminated`: never claimed.
///
/// [`NodeRegistry::find_candidates`]: crate::registry::NodeRegistry::find_candidates
#[derive(Debug, Default)]
pub struct FirstFitPolicy;

impl FirstFitPolicy {
    pub const NAME: &'static str = "first_fit";

    pub fn new() -> Self {
        Self
    }
}

impl PolicyModule for FirstFitPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn try_claim(
        &mut self,
        session: &mut Session,
        target: SessionState,
        ctx: &mut ClaimContext<'_>,
    ) -> Result<Claim, PolicyError> {
        match target {
            SessionState::Schedule => {
                if session.allocation().may_start_at(ctx.now) {
                    Ok(Claim::Claimed)
                } else {
                    debug!(session = session.id(), "begin time not reached");
                    Ok(Claim::Declined)
                }
            }
            SessionState::Allocd => {
                let Some(nodes) = ctx.registry.find_candidates(session.allocation()) else {
                    return Ok(Claim::Declined);
                };
                ctx.registry
                    .commit_step(session, &nodes)
                    .map_err(|e| PolicyError::Claim {
                        module: Self::NAME.to_string(),
                        session: session.id(),
                        reason: e.to_string(),
                    })?;
                Ok(Claim::Claimed)
            }
            SessionState::Undef | SessionState::Init | SessionState::Terminated => {
                Ok(Claim::Declined)
            }
        }
    }
}
