//! Session state for lobbymesh.
//!
//! This crate owns the data the coordinator mutates:
//!
//! 1. **The session entity** ([`Session`]) — identity, world seed, and
//!    the ordered roster that doubles as the backup-host succession list.
//! 2. **Liveness bookkeeping** ([`HeartbeatTracker`]) — the host's record
//!    of which members are still reporting in.
//! 3. **Discovery** ([`DiscoveryCache`], [`DiscoveredSession`]) — the
//!    sessions this peer has learned about but not joined.
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← drives state transitions through these types
//!     ↕
//! Session Layer (this crate)  ← membership, succession, liveness data
//!     ↕
//! Protocol Layer (below)  ← provides PeerId, SessionId, Member
//! ```

mod discovery;
mod error;
mod heartbeat;
mod session;

pub use discovery::{DiscoveredSession, DiscoveryCache};
pub use error::SessionError;
pub use heartbeat::HeartbeatTracker;
pub use session::{Session, generate_seed, generate_session_id};
