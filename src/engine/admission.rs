// src/engine/admission.rs

//! State shared between the core and every [`SchedulerHandle`]: the last
//! issued session id and the names of the declared queues.
//!
//! [`SchedulerHandle`]: crate::engine::SchedulerHandle

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use crate::errors::{Result, SchedulerError};
use crate::types::SessionId;

#[derive(Debug, Default)]
pub(crate) struct Admission {
    last_id: Mutex<SessionId>,
    queues: RwLock<Vec<String>>,
}

impl Admission {
    /// Take the next session id and run `f` with it before any other
    /// submitter can take one.
    ///
    /// `f` hands the session on (sends it to the engine, or queues it
    /// directly), so sessions reach the core in id order. It must not block.
    pub(crate) fn issue<T>(&self, f: impl FnOnce(SessionId) -> T) -> T {
        let mut last = lock_or_recover(&self.last_id);
        *last += 1;
        f(*last)
    }

    /// `None` selects the first queue, so it only fails when there are none.
    pub(crate) fn check_queue(&self, name: Option<&str>) -> Result<()> {
        let queues = read_or_recover(&self.queues);
        match name {
            Some(name) if !queues.iter().any(|q| q == name) => {
                Err(SchedulerError::UnknownQueue(name.to_string()))
            }
            None if queues.is_empty() => Err(SchedulerError::UnknownQueue(String::new())),
            _ => Ok(()),
        }
    }

    pub(crate) fn queue_names(&self) -> Vec<String> {
        read_or_recover(&self.queues).clone()
    }

    pub(crate) fn add_queue(&self, name: &str) {
        write_or_recover(&self.queues).push(name.to_string());
    }

    pub(crate) fn clear_queues(&self) {
        write_or_recover(&self.queues).clear();
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("session id lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn read_or_recover<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|poisoned| {
        warn!("queue directory poisoned, recovering for read");
        poisoned.into_inner()
    })
}

fn write_or_recover<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|poisoned| {
        warn!("queue directory poisoned, recovering for write");
        poisoned.into_inner()
    })
}
