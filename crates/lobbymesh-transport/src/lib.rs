//! Transport abstraction for lobbymesh.
//!
//! The coordinator is written against the [`Transport`] trait; how
//! packets actually move between peers — sockets, relays, a LAN
//! broadcast layer — is the implementation's business, not the
//! protocol's. [`MemoryMesh`] provides an in-process implementation for
//! tests and demos.
//!
//! Delivery is *unreliable by contract*: a packet addressed to an
//! unreachable peer is dropped, not an error. The protocol's periodic
//! pings and heartbeats are the retry mechanism.

#![allow(async_fn_in_trait)]

mod error;
mod memory;

pub use error::TransportError;
pub use memory::{MemoryMesh, MeshEndpoint};

use lobbymesh_protocol::{Packet, PeerId};

/// A peer's connection to the rest of the group.
///
/// Implementations resolve a packet's [`Target`](lobbymesh_protocol::Target):
/// `Host` reaches the peer currently routing as host, `Clients` fans out
/// to every other reachable peer, `Peer` reaches one specific peer.
pub trait Transport: Send + Sync + 'static {
    /// This peer's stable identifier.
    fn local_peer(&self) -> PeerId;

    /// Routes a packet according to its header's target. Unreachable
    /// targets are silently dropped.
    fn deliver(
        &self,
        packet: Packet,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next inbound packet.
    ///
    /// Returns `Ok(None)` when the transport has shut down for good.
    fn recv(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<Packet>, TransportError>> + Send;

    /// Switches the transport's role bookkeeping so host-targeted
    /// traffic routes to this peer. Called when this peer creates a
    /// session or takes over a dead host's.
    fn assume_host(
        &self,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}
