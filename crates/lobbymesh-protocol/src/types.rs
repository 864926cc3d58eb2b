//! Core wire types for the lobbymesh session protocol.
//!
//! Everything here travels between peers: identifiers, roster entries,
//! the session message variants, and the packet envelope the transport
//! wraps around them.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A peer's stable identifier, assigned by the transport layer.
///
/// Newtype wrapper around the opaque id string so a peer id can't be
/// confused with a session id in a signature. `#[serde(transparent)]`
/// keeps the wire form a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Creates a peer id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A session's unique identifier, generated by the creating host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Roster entries
// ---------------------------------------------------------------------------

/// One roster entry: a peer id paired with the display name it joined
/// under. Roster order is significant — it defines backup-host
/// succession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The peer's transport identity.
    pub peer_id: PeerId,
    /// The human-readable name the peer chose when joining.
    pub display_name: String,
}

impl Member {
    /// Creates a roster entry.
    pub fn new(peer_id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            peer_id,
            display_name: display_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Target — who a packet is addressed to
// ---------------------------------------------------------------------------

/// The logical target of a packet.
///
/// On the wire this is a plain string: `"host"`, `"client"`, or a
/// specific peer id. The `from`/`into` serde attributes keep the enum in
/// Rust and the string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Target {
    /// The peer currently acting as session host.
    Host,
    /// Every client in the session.
    Clients,
    /// One specific peer.
    Peer(PeerId),
}

impl Target {
    /// `true` for the role-agnostic fan-out targets (`host`/`client`).
    pub fn is_fanout(&self) -> bool {
        matches!(self, Target::Host | Target::Clients)
    }

    /// `true` if this target addresses the given peer specifically.
    pub fn is_peer(&self, peer: &PeerId) -> bool {
        matches!(self, Target::Peer(p) if p == peer)
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        match s.as_str() {
            "host" => Target::Host,
            "client" => Target::Clients,
            _ => Target::Peer(PeerId(s)),
        }
    }
}

impl From<Target> for String {
    fn from(target: Target) -> String {
        match target {
            Target::Host => "host".to_owned(),
            Target::Clients => "client".to_owned(),
            Target::Peer(peer) => peer.0,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Host => write!(f, "host"),
            Target::Clients => write!(f, "client"),
            Target::Peer(peer) => write!(f, "{peer}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Replicated game-configuration values
// ---------------------------------------------------------------------------

/// Monster difficulty levels replicated across the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonsterDifficulty {
    Easy,
    Medium,
    Hard,
    Impossible,
}

impl fmt::Display for MonsterDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonsterDifficulty::Easy => "Easy",
            MonsterDifficulty::Medium => "Medium",
            MonsterDifficulty::Hard => "Hard",
            MonsterDifficulty::Impossible => "Impossible",
        };
        write!(f, "{name}")
    }
}

/// Item spawn rates replicated across the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemSpawnRate {
    Low,
    Medium,
    High,
}

impl fmt::Display for ItemSpawnRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemSpawnRate::Low => "Low",
            ItemSpawnRate::Medium => "Medium",
            ItemSpawnRate::High => "High",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// SessionMessage — the protocol payload
// ---------------------------------------------------------------------------

/// The session protocol payload, one variant per message kind.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "SendPing" }`, `{ "type": "RequestSessionsResponse",
/// "name": "...", "seed": 42, "roster": [...] }`. Each variant carries
/// only the fields relevant to its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionMessage {
    /// Broadcast by a peer looking for sessions to join.
    RequestSessions,

    /// A host's answer to a discovery request: its session's summary.
    RequestSessionsResponse {
        name: String,
        seed: i64,
        roster: Vec<Member>,
    },

    /// A join request (single-entry roster, sent to the host) or the
    /// host's authoritative membership broadcast (full roster plus the
    /// immutable seed, sent to all clients). Broadcasting the entire
    /// roster after every join keeps resynchronization idempotent.
    RequestToJoinSession { seed: i64, roster: Vec<Member> },

    /// Periodic liveness report from a non-host member to the host.
    SendHeartbeat,

    /// Host-liveness probe from the backup host.
    SendPing,

    /// The host's answer to a ping.
    ReceivedPingResponse,

    /// Announcement from a freshly promoted host; the member next in
    /// roster order after the announcer takes over as backup host.
    NewBackupHost,

    /// A difficulty edit to replicate to every peer.
    EditMonsterDifficulty { difficulty: MonsterDifficulty },

    /// A spawn-rate edit to replicate to every peer.
    EditItemSpawnRate { spawn_rate: ItemSpawnRate },
}

// ---------------------------------------------------------------------------
// Packet envelope
// ---------------------------------------------------------------------------

/// Addressing metadata for a packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// The session this packet belongs to (or is discovering).
    pub session_id: SessionId,
    /// Who should process the packet.
    pub target: Target,
    /// The peer the packet originated from.
    pub origin: PeerId,
}

/// A previously computed handler reply carried on a relayed packet.
///
/// When a node relays a reply it already produced locally (a discovery
/// result, a ping answer, a membership broadcast), the reply rides here
/// so receivers read it without re-processing the request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    /// The serialized [`SessionMessage`] the original handler produced.
    pub result_message: String,
}

/// The transport-level envelope around a serialized [`SessionMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Addressing metadata.
    pub header: PacketHeader,
    /// The serialized session message.
    pub payload: String,
    /// A relayed reply, if this packet carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_response: Option<HandlerResponse>,
}

// ---------------------------------------------------------------------------
// Handler outcomes
// ---------------------------------------------------------------------------

/// What the coordinator should do with a handler's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAction {
    /// Nothing to transmit.
    Ignore,
    /// Send the reply back to the packet's origin peer.
    ReturnToSender,
    /// Re-broadcast to all clients in the session.
    SendToClients,
}

/// The decision a protocol handler returns.
///
/// Handlers never transmit; the coordinator executes the outcome through
/// the transport. This keeps "decide" and "send" cleanly separated, so
/// handlers stay testable without a live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// How the coordinator should route the result.
    pub action: SendAction,
    /// The serialized reply to attach, when the action carries one.
    pub payload: Option<String>,
}

impl HandlerOutcome {
    /// No transmission.
    pub fn ignore() -> Self {
        Self {
            action: SendAction::Ignore,
            payload: None,
        }
    }

    /// Reply to the packet's origin with the given serialized message.
    pub fn reply(payload: impl Into<String>) -> Self {
        Self {
            action: SendAction::ReturnToSender,
            payload: Some(payload.into()),
        }
    }

    /// Re-broadcast to all clients with the given serialized reply
    /// attached.
    pub fn broadcast(payload: impl Into<String>) -> Self {
        Self {
            action: SendAction::SendToClients,
            payload: Some(payload.into()),
        }
    }

    /// Re-broadcast the inbound packet to all clients unchanged (used to
    /// relay an announcement one hop further).
    pub fn relay() -> Self {
        Self {
            action: SendAction::SendToClients,
            payload: None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
