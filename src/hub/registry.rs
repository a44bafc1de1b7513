//! Registry of live sessions.
//!
//! Maps session ids to their [`SessionHandle`]. Inserts and removals take the
//! write lock; lookups and listings take the read lock and copy out what they
//! need before it is released, so no lock is ever held across an `.await`.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::session::{SessionHandle, SessionId};

/// All sessions currently attached to a hub.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session.
    ///
    /// If a session with the same ID already exists, it is replaced.
    pub fn insert(&self, session: SessionHandle) {
        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        sessions.insert(session.id(), session);
    }

    /// Unregister a session, returning its handle if it was present.
    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().expect("sessions lock poisoned");
        sessions.remove(&id)
    }

    /// Copy out the handle for `id`.
    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        let sessions = self.sessions.read().expect("sessions lock poisoned");
        sessions.get(&id).cloned()
    }

    /// Ids of all registered sessions, ascending.
    pub fn ids(&self) -> BTreeSet<SessionId> {
        let sessions = self.sessions.read().expect("sessions lock poisoned");
        sessions.keys().copied().collect()
    }

    /// Ids of all registered sessions except `exclude`, ascending.
    pub fn others(&self, exclude: SessionId) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = {
            let sessions = self.sessions.read().expect("sessions lock poisoned");
            sessions.keys().copied().filter(|id| *id != exclude).collect()
        };
        ids.sort_unstable();
        ids
    }

    /// Handles of all registered sessions, in no particular order.
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        let sessions = self.sessions.read().expect("sessions lock poisoned");
        sessions.values().cloned().collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().expect("sessions lock poisoned").len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
