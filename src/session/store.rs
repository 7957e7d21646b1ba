//! Token material storage keyed by session id.
//!
//! Records are replaced whole: callers read, modify and write back the full
//! [`Session`], never individual fields.

use std::collections::HashMap;
use std::sync::RwLock;

use super::types::Session;

/// Holder of the current [`Session`] for each session id.
///
/// Reads must not block on I/O; the gate consults the store on every request.
pub trait TokenStore: Send + Sync + 'static {
    fn read(&self, session_id: &str) -> Option<Session>;

    /// Full replace of the record for `session_id`.
    fn write(&self, session_id: &str, session: Session);

    /// Full replace only if a record still exists, checked and written under
    /// one lock. Returns whether the write happened.
    fn replace_if_present(&self, session_id: &str, session: Session) -> bool;

    /// Remove the record. Returns whether one existed.
    fn remove(&self, session_id: &str) -> bool;

    /// Drop every record whose signed artifact expired before `now` (epoch millis).
    fn purge_expired(&self, now: i64) -> usize;
}

/// Process-local [`TokenStore`].
///
/// Multi-process deployments need a shared single-writer implementation instead.
#[derive(Default)]
pub struct MemoryTokenStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn read(&self, session_id: &str) -> Option<Session> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).cloned()
    }

    fn write(&self, session_id: &str, session: Session) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.to_string(), session);
    }

    fn replace_if_present(&self, session_id: &str, session: Session) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(session_id) {
            Some(slot) => {
                *slot = session;
                true
            }
            None => false,
        }
    }

    fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id).is_some()
    }

    fn purge_expired(&self, now: i64) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }
}
