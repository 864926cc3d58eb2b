//! Presentation-layer seam.
//!
//! The coordinator pushes updates through this trait regardless of what
//! the application is currently rendering; the presentation layer
//! decides whether and how to show them. This replaces any notion of
//! the coordinator knowing about "screens".

use lobbymesh_protocol::Member;
use lobbymesh_session::DiscoveredSession;

/// Receives lobby and session-list updates from the coordinator.
///
/// All methods have default no-op implementations — implement only what
/// the application renders. Callbacks run on the coordinator's tasks and
/// must return promptly; in particular they must not call back into the
/// coordinator.
pub trait LobbyObserver: Send + Sync + 'static {
    /// The membership roster changed (a join, a resync broadcast, or a
    /// promotion round).
    fn on_roster_changed(&self, _roster: &[Member]) {}

    /// A discovery response arrived for a session this peer could join.
    fn on_session_discovered(&self, _session: &DiscoveredSession) {}

    /// A human-readable status line ("Joined game with name: …").
    fn on_status(&self, _message: &str) {}
}

/// An observer that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl LobbyObserver for NullObserver {}
