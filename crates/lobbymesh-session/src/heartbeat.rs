//! Host-side liveness bookkeeping for session members.
//!
//! # Concurrency note
//!
//! `HeartbeatTracker` is a plain map, not a concurrent one. It is owned
//! by the coordinator and only touched under the coordinator's state
//! lock, so no internal locking is needed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use lobbymesh_protocol::PeerId;

/// A member with no heartbeat within this many intervals is stale.
const STALE_INTERVALS: u32 = 3;

/// Tracks the most recent heartbeat from each expected session member.
///
/// Created fresh each time this peer takes the host role, seeded with
/// the member set minus the host itself; discarded when the role is
/// left. Staleness is *reported* only — nothing here (or in the
/// coordinator) evicts a stale member. That reaction is an open
/// extension point.
#[derive(Debug)]
pub struct HeartbeatTracker {
    last_seen: HashMap<PeerId, Instant>,
    heartbeat_interval: Duration,
}

impl HeartbeatTracker {
    /// Creates a tracker expecting heartbeats from `expected`. Each
    /// entry's baseline is the moment of creation, so a member that
    /// never reports in goes stale relative to the host's promotion.
    pub fn new(
        expected: impl IntoIterator<Item = PeerId>,
        heartbeat_interval: Duration,
    ) -> Self {
        let now = Instant::now();
        let last_seen =
            expected.into_iter().map(|peer| (peer, now)).collect();
        Self {
            last_seen,
            heartbeat_interval,
        }
    }

    /// Records a heartbeat from `peer` at the current instant.
    ///
    /// Unknown senders are registered rather than rejected — a member
    /// the host hasn't caught up on yet is still a member.
    pub fn record(&mut self, peer: PeerId) {
        tracing::trace!(peer_id = %peer, "heartbeat recorded");
        self.last_seen.insert(peer, Instant::now());
    }

    /// When `peer` was last heard from, if it is tracked at all.
    pub fn last_seen(&self, peer: &PeerId) -> Option<Instant> {
        self.last_seen.get(peer).copied()
    }

    /// Whether `peer` has gone silent: no heartbeat within
    /// 3× the heartbeat interval as of `now`. Untracked peers are not
    /// stale — there is nothing to judge them by.
    pub fn is_stale(&self, peer: &PeerId, now: Instant) -> bool {
        match self.last_seen.get(peer) {
            Some(seen) => {
                now.saturating_duration_since(*seen)
                    > self.heartbeat_interval * STALE_INTERVALS
            }
            None => false,
        }
    }

    /// Every tracked peer that is stale as of `now`.
    pub fn stale_peers(&self, now: Instant) -> Vec<PeerId> {
        self.last_seen
            .keys()
            .filter(|peer| self.is_stale(peer, now))
            .cloned()
            .collect()
    }

    /// Number of peers currently tracked.
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
