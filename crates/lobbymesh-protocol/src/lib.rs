//! Wire protocol for lobbymesh.
//!
//! This crate defines the "language" that peers in a session group speak:
//!
//! - **Types** ([`Packet`], [`SessionMessage`], [`Target`], etc.) — the
//!   structures that travel between peers.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw packet delivery)
//! and the coordinator (session state). It doesn't know about roles,
//! rosters, or liveness — it only knows message shapes.
//!
//! ```text
//! Transport (packets) → Protocol (SessionMessage) → Coordinator (state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    HandlerOutcome, HandlerResponse, ItemSpawnRate, Member,
    MonsterDifficulty, Packet, PacketHeader, PeerId, SendAction,
    SessionId, SessionMessage, Target,
};
