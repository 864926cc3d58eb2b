//! Cache of sessions learned through discovery responses.

use std::collections::HashMap;

use lobbymesh_protocol::{Member, SessionId};

/// A session summary learned from another host's discovery response.
///
/// Holds everything a join needs (name and seed) plus the roster
/// snapshot the presentation layer renders in the session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSession {
    /// The advertised session's id.
    pub session_id: SessionId,
    /// The advertised session's name.
    pub name: String,
    /// The advertised session's world seed.
    pub seed: i64,
    /// Membership at the time the host answered.
    pub roster: Vec<Member>,
}

impl DiscoveredSession {
    /// The host's display name — the first roster entry, by convention.
    pub fn host_name(&self) -> Option<&str> {
        self.roster.first().map(|m| m.display_name.as_str())
    }

    /// Member count at discovery time.
    pub fn member_count(&self) -> usize {
        self.roster.len()
    }
}

/// Sessions this peer has discovered but not joined, keyed by session id.
///
/// Insertion is first-write-wins: a repeat response for a session id
/// does not clobber the entry already cached.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    sessions: HashMap<SessionId, DiscoveredSession>,
}

impl DiscoveryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches a discovery result. Returns whether the session was new.
    pub fn insert(&mut self, discovered: DiscoveredSession) -> bool {
        let session_id = discovered.session_id.clone();
        if self.sessions.contains_key(&session_id) {
            return false;
        }
        tracing::debug!(%session_id, name = %discovered.name, "session discovered");
        self.sessions.insert(session_id, discovered);
        true
    }

    /// Looks up a cached session by id.
    pub fn get(&self, session_id: &SessionId) -> Option<&DiscoveredSession> {
        self.sessions.get(session_id)
    }

    /// Every cached session, in no particular order.
    pub fn sessions(&self) -> impl Iterator<Item = &DiscoveredSession> {
        self.sessions.values()
    }

    /// Number of cached sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` if nothing has been discovered yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
