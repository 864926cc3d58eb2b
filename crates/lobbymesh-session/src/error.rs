//! Error types for the session layer.

/// Errors that can occur in session-state handling.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A handler that requires an active session ran without one. The
    /// routing table is supposed to make this impossible, so hitting it
    /// means a protocol invariant broke upstream.
    #[error("no active session")]
    NotInSession,
}
