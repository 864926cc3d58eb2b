//! Error types for the transport layer.

use lobbymesh_protocol::PeerId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport has shut down; no further traffic is possible.
    #[error("transport closed")]
    Closed,

    /// This peer is not attached to the mesh (never attached, or
    /// detached since).
    #[error("peer {0} is not attached")]
    NotAttached(PeerId),

    /// Sending a packet failed for a transport-specific reason.
    #[error("send failed: {0}")]
    SendFailed(String),
}
