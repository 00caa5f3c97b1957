// src/errors.rs

//! Error types shared by the scheduler, the registry and policy modules.

use thiserror::Error;

use crate::types::{SessionId, SessionState};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    #[error("Node {0} is not available for commit")]
    NodeUnavailable(String),

    #[error("Illegal transition for session {session}: {from} -> {to}")]
    IllegalTransition {
        session: SessionId,
        from: SessionState,
        to: SessionState,
    },

    #[error("Policy module error: {0}")]
    PolicyError(#[from] PolicyError),

    #[error("Event engine failed to start: {0}")]
    EngineStart(String),

    #[error("Event engine is not running")]
    EngineStopped,
}

/// Failure reported by a policy module.
///
/// Returned from `init()` (the module is then not registered) or from
/// `try_claim()` (the module is skipped for that attempt).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("module '{module}' failed to initialise: {reason}")]
    Init { module: String, reason: String },

    #[error("module '{module}' failed while handling session {session}: {reason}")]
    Claim {
        module: String,
        session: SessionId,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
