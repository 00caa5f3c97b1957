// src/model/mod.rs

//! Request and bookkeeping entities.
//!
//! Ownership is strictly hierarchical: a [`Queue`] owns its [`Session`]s, a
//! session owns its [`Allocation`] and [`Step`]s, and a step owns the list of
//! node indices committed to it. Nodes themselves live in the registry arena.

pub mod allocation;
pub mod queue;
pub mod session;

pub use allocation::{Allocation, IMAGE_CONSTRAINT_PREFIX};
pub use queue::Queue;
pub use session::{Job, ProvisionStatus, Session, SessionEvent, Step};
