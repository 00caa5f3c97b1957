// src/collab.rs

//! Interfaces to the collaborators that live outside the scheduler core.
//!
//! None of these calls may block the engine thread: implementations are
//! expected to hand work off (to a thread, a task, a socket) and report back
//! through the supplied callback, from whichever thread they like. The engine
//! wraps each callback so the result re-enters scheduler state only through
//! its own channel.

use std::fmt;

use crate::types::SessionId;

/// Value carried by a telemetry record.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

/// One key/value metric sample for a node, pushed by the telemetry side.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub node: String,
    pub key: String,
    pub value: MetricValue,
}

impl MetricRecord {
    pub fn number(node: impl Into<String>, key: impl Into<String>, value: f64) -> Self {
        Self {
            node: node.into(),
            key: key.into(),
            value: MetricValue::Number(value),
        }
    }

    pub fn text(node: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            key: key.into(),
            value: MetricValue::Text(value.into()),
        }
    }
}

/// Failure reported by a collaborator through its completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorError(pub String);

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CollaboratorError {}

pub type CompletionCallback =
    Box<dyn FnOnce(Result<(), CollaboratorError>) + Send + 'static>;

/// Request to provision a node set with an image before the session may be
/// marked allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    pub session: SessionId,
    pub nodes: Vec<String>,
    pub image: String,
    /// Free-form `key=value` attributes (the resource constraints of the
    /// allocation).
    pub attributes: Vec<String>,
}

/// Node image provisioning agent.
pub trait Provisioner: Send + Sync {
    fn provision(&self, request: ProvisionRequest, done: CompletionCallback);
}

/// Provisioner used when none is configured: every request fails.
#[derive(Debug, Default, Clone)]
pub struct NullProvisioner;

impl Provisioner for NullProvisioner {
    fn provision(&self, request: ProvisionRequest, done: CompletionCallback) {
        done(Err(CollaboratorError(format!(
            "no provisioner configured for image '{}'",
            request.image
        ))));
    }
}

/// A single historical record: ordered key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub fields: Vec<(String, String)>,
}

impl HistoryRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink for historical allocation records.
pub trait HistoryStore: Send + Sync {
    fn store(&self, record_set: &str, records: Vec<HistoryRecord>, done: CompletionCallback);
}

/// History store that accepts and discards everything.
#[derive(Debug, Default, Clone)]
pub struct NullHistoryStore;

impl HistoryStore for NullHistoryStore {
    fn store(&self, _record_set: &str, _records: Vec<HistoryRecord>, done: CompletionCallback) {
        done(Ok(()));
    }
}
