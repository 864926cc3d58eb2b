//! End-to-end failover demo.
//!
//! Three peers share an in-memory mesh: Alice hosts a session, Bob and
//! Carol discover and join it. Bob — second in the roster — becomes the
//! backup host. Then Alice's process "crashes" (her endpoint detaches),
//! Bob's ping loop notices the silence and takes over, and Carol becomes
//! the new backup.
//!
//! Run with `RUST_LOG=info cargo run -p failover-demo` to watch the
//! protocol at work.

use std::sync::Arc;
use std::time::Duration;

use lobbymesh::{
    LobbyObserver, MemoryConfigStore, SessionCoordinator,
};
use lobbymesh_protocol::{Member, MonsterDifficulty, PeerId};
use lobbymesh_session::DiscoveredSession;
use lobbymesh_transport::{MemoryMesh, MeshEndpoint};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prints every lobby event, tagged with the peer's name.
struct ConsoleObserver {
    name: &'static str,
}

impl LobbyObserver for ConsoleObserver {
    fn on_roster_changed(&self, roster: &[Member]) {
        let names: Vec<&str> =
            roster.iter().map(|m| m.display_name.as_str()).collect();
        info!(peer = self.name, roster = ?names, "roster changed");
    }

    fn on_session_discovered(&self, session: &DiscoveredSession) {
        info!(
            peer = self.name,
            session = %session.session_id,
            name = %session.name,
            host = session.host_name().unwrap_or("?"),
            members = session.member_count(),
            "session discovered"
        );
    }

    fn on_status(&self, message: &str) {
        info!(peer = self.name, "{message}");
    }
}

type Peer =
    Arc<SessionCoordinator<MeshEndpoint, MemoryConfigStore, ConsoleObserver>>;

async fn spawn_peer(mesh: &MemoryMesh, name: &'static str) -> Peer {
    let endpoint = mesh.attach(PeerId::new(name)).await;
    let coordinator = Arc::new(SessionCoordinator::new(
        endpoint,
        MemoryConfigStore::new(),
        ConsoleObserver { name },
    ));
    tokio::spawn(Arc::clone(&coordinator).run());
    coordinator
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;
    let carol = spawn_peer(&mesh, "carol").await;

    // Alice opens the lobby.
    alice
        .create_session("Dungeon", "Alice")
        .await
        .expect("create session");

    // Bob and Carol discover it and join.
    for (peer, name) in [(&bob, "Bob"), (&carol, "Carol")] {
        peer.request_sessions().await.expect("discovery");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let sessions = peer.discovered_sessions().await;
        let session_id = sessions
            .first()
            .expect("a session should have been discovered")
            .session_id
            .clone();
        peer.join_session(&session_id, name).await.expect("join");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let roles = (
        alice.role().await,
        bob.role().await,
        carol.role().await,
    );
    info!(?roles, "lobby assembled (alice, bob, carol)");

    // A difficulty edit from a plain member replicates through the host.
    carol
        .edit_monster_difficulty(MonsterDifficulty::Hard)
        .await
        .expect("edit difficulty");
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Alice's process dies. Nobody is told — the backup host has to
    // notice on its own.
    info!("--- detaching the host ---");
    mesh.detach(&PeerId::new("alice")).await;

    // Five unanswered ping cycles ≈ 5.5 s, plus the announcement round.
    tokio::time::sleep(Duration::from_secs(8)).await;

    let bob_role = bob.role().await;
    let carol_role = carol.role().await;
    let mesh_host = mesh.host().await;
    info!(?bob_role, ?carol_role, ?mesh_host, "after failover");

    alice.shutdown().await;
    bob.shutdown().await;
    carol.shutdown().await;
}
