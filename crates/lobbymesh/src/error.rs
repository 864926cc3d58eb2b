//! Unified error type for the lobbymesh meta-crate.

use lobbymesh_protocol::ProtocolError;
use lobbymesh_session::SessionError;
use lobbymesh_transport::TransportError;

/// Top-level error that wraps all layer-specific errors.
///
/// The `#[from]` attributes auto-generate `From` impls, so the `?`
/// operator converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// A protocol-level error (encode, decode, invalid message shape).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-state error (missing session, unknown session id).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A transport-level error, opaque to the protocol.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let lobby_err: LobbyError = err.into();
        assert!(matches!(lobby_err, LobbyError::Protocol(_)));
        assert!(lobby_err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::NotInSession;
        let lobby_err: LobbyError = err.into();
        assert!(matches!(lobby_err, LobbyError::Session(_)));
    }

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::Closed;
        let lobby_err: LobbyError = err.into();
        assert!(matches!(lobby_err, LobbyError::Transport(_)));
    }
}
