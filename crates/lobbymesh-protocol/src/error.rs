//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// When a `ProtocolError` shows up, the problem is in serialization or
/// message shape — not in transport or session state.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a
    /// payload whose kind doesn't match what the routing table promised.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is invalid at the protocol level — it deserialized
    /// fine but violates a protocol rule (e.g., a join request carrying
    /// an empty roster).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
