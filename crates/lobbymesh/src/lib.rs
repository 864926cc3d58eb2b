//! # lobbymesh
//!
//! Serverless peer-group session coordination with host failover.
//!
//! A small group of peers — one *host*, several *clients* — plays a
//! shared session with no central server. Peers discover sessions, join
//! them, and replicate the membership roster. The member right after the
//! host in roster order is the *backup host*: it pings the host every
//! second, and after five consecutive unanswered probes it takes over,
//! announces itself, and the next member in order becomes the new
//! backup.
//!
//! The [`SessionCoordinator`] is the heart of the crate: it classifies
//! inbound packets, runs the protocol handlers, and drives the ping and
//! heartbeat workers. Transport, presentation, and game-configuration
//! storage are collaborators behind traits
//! ([`Transport`](lobbymesh_transport::Transport), [`LobbyObserver`],
//! [`GameConfigStore`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lobbymesh::{MemoryConfigStore, NullObserver, SessionCoordinator};
//! use lobbymesh_protocol::PeerId;
//! use lobbymesh_transport::MemoryMesh;
//!
//! # async fn demo() -> Result<(), lobbymesh::LobbyError> {
//! let mesh = MemoryMesh::new();
//! let endpoint = mesh.attach(PeerId::new("alice")).await;
//! let coordinator = Arc::new(SessionCoordinator::new(
//!     endpoint,
//!     MemoryConfigStore::new(),
//!     NullObserver,
//! ));
//! tokio::spawn(Arc::clone(&coordinator).run());
//! coordinator.create_session("Dungeon", "Alice").await?;
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod error;
mod events;
mod store;

pub use coordinator::{CoordinatorConfig, PeerRole, SessionCoordinator};
pub use error::LobbyError;
pub use events::{LobbyObserver, NullObserver};
pub use store::{GameConfigStore, MemoryConfigStore};
