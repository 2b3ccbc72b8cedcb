//! Registry of live sessions.
//!
//! All mutations go through a single mutex that is never held across an
//! await point. Sessions are keyed by their `SessionId`, which the server
//! never reuses, so a late `remove` from a finished handler cannot evict a
//! newer session.

use crate::message::Message;
use crate::session::{Session, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
pub struct Hub {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a session. A session with the same id is replaced.
    pub fn put(&self, session: Arc<Session>) {
        self.lock().insert(session.id(), session);
    }

    /// Deregister a session. Absent ids are ignored.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.lock().remove(&id)
    }

    /// Clear the registry and close every session that was in it.
    ///
    /// Returns the number of sessions dropped.
    pub fn destroy(&self) -> usize {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.lock();
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in &drained {
            session.close();
        }

        if !drained.is_empty() {
            debug!(count = drained.len(), "Hub destroyed");
        }
        drained.len()
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ids of all registered sessions, in no particular order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.lock().keys().copied().collect()
    }

    /// Offer `message` to every live session without waiting.
    ///
    /// Sessions whose queue is full or closed are skipped. Returns how many
    /// sessions accepted the message.
    pub fn broadcast(&self, message: &Message) -> usize {
        let sessions: Vec<Arc<Session>> = self.lock().values().cloned().collect();

        sessions
            .iter()
            .filter(|session| session.try_put(message.clone()).is_ok())
            .count()
    }
}
