//! The session entity: identity, world seed, and the ordered roster.
//!
//! A [`Session`] is one peer's view of the shared play session. Two
//! invariants matter:
//!
//! - `session_id` and `seed` are fixed at construction and never change
//!   for the lifetime of the object (joining a different session means
//!   building a new `Session`, not mutating this one).
//! - The roster is insertion-ordered, and that order must converge to
//!   the host's order on every peer — it defines who becomes backup
//!   host, and in which sequence.

use lobbymesh_protocol::{Member, PeerId, SessionId};
use rand::Rng;

/// A shared play session as one peer sees it.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: SessionId,
    name: String,
    seed: i64,
    roster: Vec<Member>,
    active: bool,
}

impl Session {
    /// Creates the session a hosting peer owns. The creator is the sole
    /// member and therefore first in succession order.
    pub fn host(
        session_id: SessionId,
        name: impl Into<String>,
        seed: i64,
        creator: Member,
    ) -> Self {
        Self {
            session_id,
            name: name.into(),
            seed,
            roster: vec![creator],
            active: true,
        }
    }

    /// Creates the local view of a session this peer is joining, from a
    /// cached discovery response. The roster stays empty until the
    /// host's first membership broadcast arrives.
    pub fn joined(
        session_id: SessionId,
        name: impl Into<String>,
        seed: i64,
    ) -> Self {
        Self {
            session_id,
            name: name.into(),
            seed,
            roster: Vec::new(),
            active: true,
        }
    }

    /// The session's unique identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The human-readable session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The immutable world-generation seed.
    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Whether this peer currently considers itself in the session.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The ordered membership list.
    pub fn roster(&self) -> &[Member] {
        &self.roster
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.roster.len()
    }

    /// Whether the given peer is a member.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.roster.iter().any(|m| &m.peer_id == peer)
    }

    /// Appends a member, preserving insertion order. Idempotent by peer
    /// id: re-adding an existing member changes nothing. Returns whether
    /// the member was newly added.
    pub fn add_member(&mut self, member: Member) -> bool {
        if self.contains(&member.peer_id) {
            return false;
        }
        tracing::info!(
            session_id = %self.session_id,
            peer_id = %member.peer_id,
            members = self.roster.len() + 1,
            "member joined"
        );
        self.roster.push(member);
        true
    }

    /// Replaces the whole roster with the host's authoritative list.
    ///
    /// Membership broadcasts are wholesale last-writer-wins syncs, not
    /// incremental merges — applying the same list twice yields the same
    /// final state.
    pub fn replace_roster(&mut self, roster: Vec<Member>) {
        tracing::debug!(
            session_id = %self.session_id,
            members = roster.len(),
            "roster replaced"
        );
        self.roster = roster;
    }

    /// The designated backup host: the member right after the host in
    /// roster order, if the session has one.
    pub fn backup_candidate(&self) -> Option<&Member> {
        self.roster.get(1)
    }

    /// The member immediately following `peer` in roster order.
    ///
    /// Returns `None` when `peer` is the last entry or not a member at
    /// all — there is no wraparound, a session whose announcer is last
    /// simply has no next backup.
    pub fn successor_of(&self, peer: &PeerId) -> Option<&Member> {
        let index = self.roster.iter().position(|m| &m.peer_id == peer)?;
        self.roster.get(index + 1)
    }

    /// Peer ids of every member except `this_peer` — the expected
    /// heartbeat senders when `this_peer` hosts.
    pub fn peers_except(&self, this_peer: &PeerId) -> Vec<PeerId> {
        self.roster
            .iter()
            .filter(|m| &m.peer_id != this_peer)
            .map(|m| m.peer_id.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Generation helpers
// ---------------------------------------------------------------------------

/// Generates a fresh session id: a 32-character hex string (128 bits),
/// enough that two hosts creating sessions at the same moment won't
/// collide.
pub fn generate_session_id() -> SessionId {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    SessionId::new(
        bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>(),
    )
}

/// Generates a world seed. The value is opaque to the protocol — it is
/// fixed at creation and shipped to every joiner so all peers regenerate
/// the same world.
pub fn generate_seed() -> i64 {
    rand::rng().random()
}

// =========================================================================
// Tests
// =========================================================================
