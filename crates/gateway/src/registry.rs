use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Bookkeeping for one live relay session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub meeting_id: String,
    /// Connected backends, in configured priority order.
    pub backends: Vec<String>,
    pub primary: String,
    pub started_at: DateTime<Utc>,
}

/// Registry of live relay sessions, owned by the server state.
///
/// Each session's connection task is the sole writer of its own entry;
/// the registry exists for health reporting and teardown accounting.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, session_id: String, entry: SessionEntry) {
        self.sessions.insert(session_id, entry);
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.remove(session_id).map(|(_, entry)| entry)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
