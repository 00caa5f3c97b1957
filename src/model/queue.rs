// src/model/queue.rs

use std::collections::VecDeque;

use crate::model::session::Session;
use crate::types::SessionId;

/// A named, prioritised FIFO of sessions.
///
/// The queue owns the sessions linked into it. A session leaves a queue
/// only through [`Queue::pop_head`] or [`Queue::remove`], which hand
/// ownership back to the caller.
#[derive(Debug)]
pub struct Queue {
    name: String,
    /// Higher value = visited earlier in a scheduling pass.
    priority: i32,
    /// Declaration order, used to break priority ties.
    order: usize,
    sessions: VecDeque<Session>,
}

impl Queue {
    pub fn new(name: impl Into<String>, priority: i32, order: usize) -> Self {
        Self {
            name: name.into(),
            priority,
            order,
            sessions: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn push(&mut self, session: Session) {
        self.sessions.push_back(session);
    }

    pub fn head(&self) -> Option<&Session> {
        self.sessions.front()
    }

    pub fn pop_head(&mut self) -> Option<Session> {
        self.sessions.pop_front()
    }

    /// Put a session back in front, e.g. after an unsuccessful offer.
    pub fn requeue_head(&mut self, session: Session) {
        self.sessions.push_front(session);
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.iter().any(|s| s.id() == id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    /// Unlink a session from anywhere in the queue.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let pos = self.sessions.iter().position(|s| s.id() == id)?;
        self.sessions.remove(pos)
    }

    /// Unlink every session, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Session> + '_ {
        self.sessions.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }
}
