use std::sync::{Arc, Mutex};

use clustersched::collab::{
    CollaboratorError, CompletionCallback, HistoryRecord, HistoryStore, ProvisionRequest,
    Provisioner,
};

/// A provisioner that records requests and answers them immediately.
///
/// With `succeed = false` every request fails with a fixed message.
#[derive(Clone)]
pub struct FakeProvisioner {
    succeed: bool,
    requests: Arc<Mutex<Vec<ProvisionRequest>>>,
}

impl FakeProvisioner {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<ProvisionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Provisioner for FakeProvisioner {
    fn provision(&self, request: ProvisionRequest, done: CompletionCallback) {
        let image = request.image.clone();
        self.requests.lock().unwrap().push(request);
        if self.succeed {
            done(Ok(()));
        } else {
            done(Err(CollaboratorError(format!("image {image} unavailable"))));
        }
    }
}

/// A history store that keeps every record in memory.
#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    records: Arc<Mutex<Vec<(String, HistoryRecord)>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, HistoryRecord)> {
        self.records.lock().unwrap().clone()
    }

    /// The record written for `session`, if any.
    pub fn for_session(&self, session: u64) -> Option<HistoryRecord> {
        let wanted = session.to_string();
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|(_, r)| r.get("session") == Some(wanted.as_str()))
            .map(|(_, r)| r.clone())
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn store(&self, record_set: &str, records: Vec<HistoryRecord>, done: CompletionCallback) {
        {
            let mut guard = self.records.lock().unwrap();
            for record in records {
                guard.push((record_set.to_string(), record));
            }
        }
        done(Ok(()));
    }
}
