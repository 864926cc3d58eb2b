//! Integration tests for the session coordinator.
//!
//! All timing-sensitive tests run with `start_paused = true`: Tokio's
//! paused clock auto-advances only when every task is idle, so message
//! exchange over the in-memory mesh is deterministic and the ping state
//! machine can be measured at exact virtual instants.
//!
//! Two styles of peer appear here:
//! - *real* peers: a full `SessionCoordinator` with its dispatch loop
//!   spawned;
//! - *scripted* peers: a bare mesh endpoint the test drives by hand, to
//!   control exactly which pings get answered and to forge packets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lobbymesh::{
    LobbyObserver, MemoryConfigStore, PeerRole, SessionCoordinator,
};
use lobbymesh_protocol::{
    Codec, HandlerResponse, JsonCodec, Member, MonsterDifficulty, Packet,
    PacketHeader, PeerId, SessionId, SessionMessage, Target,
};
use lobbymesh_session::DiscoveredSession;
use lobbymesh_transport::{MemoryMesh, MeshEndpoint, Transport};

// =========================================================================
// Helpers
// =========================================================================

type Coordinator =
    SessionCoordinator<MeshEndpoint, MemoryConfigStore, RecordingObserver>;

/// An observer that records everything it is told.
#[derive(Default)]
struct RecordingObserver {
    statuses: Mutex<Vec<String>>,
    rosters: Mutex<Vec<Vec<Member>>>,
    discovered: Mutex<Vec<DiscoveredSession>>,
}

impl RecordingObserver {
    fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    fn discovered(&self) -> Vec<DiscoveredSession> {
        self.discovered.lock().unwrap().clone()
    }

    fn roster_updates(&self) -> usize {
        self.rosters.lock().unwrap().len()
    }
}

impl LobbyObserver for RecordingObserver {
    fn on_roster_changed(&self, roster: &[Member]) {
        self.rosters.lock().unwrap().push(roster.to_vec());
    }

    fn on_session_discovered(&self, session: &DiscoveredSession) {
        self.discovered.lock().unwrap().push(session.clone());
    }

    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_owned());
    }
}

fn pid(id: &str) -> PeerId {
    PeerId::new(id)
}

fn payload(message: &SessionMessage) -> String {
    String::from_utf8(JsonCodec.encode(message).unwrap()).unwrap()
}

/// Attaches a full coordinator to the mesh and spawns its dispatch loop.
async fn spawn_peer(mesh: &MemoryMesh, id: &str) -> Arc<Coordinator> {
    let endpoint = mesh.attach(pid(id)).await;
    let coordinator = Arc::new(SessionCoordinator::new(
        endpoint,
        MemoryConfigStore::new(),
        RecordingObserver::default(),
    ));
    tokio::spawn(Arc::clone(&coordinator).run());
    coordinator
}

/// Lets in-flight messages drain under the paused clock.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// A forged membership broadcast, as the host would relay it: the full
/// roster rides in `handler_response`.
fn roster_broadcast(session_id: &SessionId, roster: Vec<Member>) -> Packet {
    let sync = SessionMessage::RequestToJoinSession { seed: 7, roster };
    Packet {
        header: PacketHeader {
            session_id: session_id.clone(),
            target: Target::Clients,
            origin: pid("scripted-host"),
        },
        payload: payload(&sync),
        handler_response: Some(HandlerResponse {
            result_message: payload(&sync),
        }),
    }
}

/// A forged discovery result addressed to `to`, advertising `session_id`.
fn discovery_result(
    session_id: &SessionId,
    to: &PeerId,
    name: &str,
    roster: Vec<Member>,
) -> Packet {
    Packet {
        header: PacketHeader {
            session_id: session_id.clone(),
            target: Target::Peer(to.clone()),
            origin: pid("scripted-host"),
        },
        payload: payload(&SessionMessage::RequestSessions),
        handler_response: Some(HandlerResponse {
            result_message: payload(
                &SessionMessage::RequestSessionsResponse {
                    name: name.into(),
                    seed: 7,
                    roster,
                },
            ),
        }),
    }
}

/// A scripted host: answers pings while `answering` is true, collects
/// everything it receives.
struct ScriptedHost {
    peer: PeerId,
    answering: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<Packet>>>,
}

impl ScriptedHost {
    async fn spawn(mesh: &MemoryMesh, id: &str) -> Self {
        let peer = pid(id);
        let endpoint = mesh.attach(peer.clone()).await;
        endpoint.assume_host().await.unwrap();

        let answering = Arc::new(AtomicBool::new(true));
        let received = Arc::new(Mutex::new(Vec::new()));

        let answering_task = Arc::clone(&answering);
        let received_task = Arc::clone(&received);
        let host_peer = peer.clone();
        tokio::spawn(async move {
            while let Ok(Some(packet)) = endpoint.recv().await {
                received_task.lock().unwrap().push(packet.clone());
                let is_ping = packet
                    .payload
                    .contains("\"SendPing\"")
                    && packet.handler_response.is_none();
                if is_ping && answering_task.load(Ordering::SeqCst) {
                    let reply = Packet {
                        header: PacketHeader {
                            session_id: packet.header.session_id.clone(),
                            target: Target::Peer(
                                packet.header.origin.clone(),
                            ),
                            origin: host_peer.clone(),
                        },
                        payload: packet.payload.clone(),
                        handler_response: Some(HandlerResponse {
                            result_message: payload(
                                &SessionMessage::ReceivedPingResponse,
                            ),
                        }),
                    };
                    let _ = endpoint.deliver(reply).await;
                }
            }
        });

        Self {
            peer,
            answering,
            received,
        }
    }

    fn set_answering(&self, on: bool) {
        self.answering.store(on, Ordering::SeqCst);
    }

    fn received(&self) -> Vec<Packet> {
        self.received.lock().unwrap().clone()
    }
}

/// Sets up a real peer that believes it is the backup host of a session
/// run by a scripted host. Returns (peer, scripted host, session id).
async fn backup_under_scripted_host(
    mesh: &MemoryMesh,
) -> (Arc<Coordinator>, ScriptedHost, SessionId) {
    let host = ScriptedHost::spawn(mesh, "scripted-host").await;
    let peer = spawn_peer(mesh, "bob").await;
    let session_id = SessionId::new("scripted-session");

    // Teach the peer about the session, then let it join.
    peer.dispatch(discovery_result(
        &session_id,
        &pid("bob"),
        "Dungeon",
        vec![Member::new(host.peer.clone(), "Host")],
    ))
    .await
    .unwrap();
    assert!(peer.join_session(&session_id, "Bob").await.unwrap());

    // The host's membership broadcast puts the peer in the second slot:
    // it self-promotes to backup and starts pinging.
    peer.dispatch(roster_broadcast(
        &session_id,
        vec![
            Member::new(host.peer.clone(), "Host"),
            Member::new(pid("bob"), "Bob"),
        ],
    ))
    .await
    .unwrap();
    assert_eq!(peer.role().await, PeerRole::BackupHost);

    (peer, host, session_id)
}

// =========================================================================
// Create / discover / join
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_create_session_makes_host_with_sole_member() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;

    let active = alice.create_session("Dungeon", "Alice").await.unwrap();

    assert!(active);
    assert_eq!(alice.role().await, PeerRole::Host);
    assert!(alice.in_session().await);
    let roster = alice.roster().await;
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].peer_id, pid("alice"));
    assert_eq!(roster[0].display_name, "Alice");
    assert!(alice.session_seed().await.is_some());
    assert_eq!(mesh.host().await, Some(pid("alice")));
    assert!(
        alice
            .observer()
            .statuses()
            .iter()
            .any(|s| s.contains("Created session with the name: Dungeon"))
    );
}

#[tokio::test]
async fn test_create_session_fires_side_task() {
    // Runs on the real clock: the side task executes on the blocking
    // pool, which a paused clock cannot see.
    let mesh = MemoryMesh::new();
    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = Arc::clone(&fired);

    let endpoint = mesh.attach(pid("alice")).await;
    let alice = Arc::new(
        SessionCoordinator::new(
            endpoint,
            MemoryConfigStore::new(),
            RecordingObserver::default(),
        )
        .with_side_task(move || {
            fired_clone.store(true, Ordering::SeqCst);
        }),
    );
    tokio::spawn(Arc::clone(&alice).run());

    alice.create_session("Dungeon", "Alice").await.unwrap();

    for _ in 0..200 {
        if fired.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(fired.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_discovery_round_trip() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;

    let discovered = bob.observer().discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].name, "Dungeon");
    assert_eq!(discovered[0].host_name(), Some("Alice"));
    assert_eq!(discovered[0].member_count(), 1);
    assert_eq!(bob.discovered_sessions().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_join_before_discovery_fails_softly_and_emits_nothing() {
    let mesh = MemoryMesh::new();
    let host = ScriptedHost::spawn(&mesh, "scripted-host").await;
    let bob = spawn_peer(&mesh, "bob").await;

    let joined = bob
        .join_session(&SessionId::new("never-discovered"), "Bob")
        .await
        .unwrap();
    settle().await;

    assert!(!joined);
    assert!(!bob.in_session().await);
    assert!(
        bob.observer()
            .statuses()
            .iter()
            .any(|s| s.contains("Could not find game!"))
    );
    // No join request (or anything else) reached the host.
    assert!(host.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_join_after_discovery_succeeds_and_roster_converges() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;

    let session_id = bob.discovered_sessions().await[0].session_id.clone();
    let joined = bob.join_session(&session_id, "Bob").await.unwrap();
    settle().await;

    assert!(joined);
    assert!(bob.in_session().await);
    assert_eq!(bob.session_seed().await, alice.session_seed().await);
    assert!(
        bob.observer()
            .statuses()
            .iter()
            .any(|s| s.contains("Joined game with name: Dungeon"))
    );

    // Host and joiner agree on the roster, in host order.
    let host_roster: Vec<PeerId> = alice
        .roster()
        .await
        .into_iter()
        .map(|m| m.peer_id)
        .collect();
    let peer_roster: Vec<PeerId> =
        bob.roster().await.into_iter().map(|m| m.peer_id).collect();
    assert_eq!(host_roster, vec![pid("alice"), pid("bob")]);
    assert_eq!(peer_roster, host_roster);
}

#[tokio::test(start_paused = true)]
async fn test_second_roster_slot_becomes_backup_host() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;
    let carol = spawn_peer(&mesh, "carol").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;
    let session_id = bob.discovered_sessions().await[0].session_id.clone();
    bob.join_session(&session_id, "Bob").await.unwrap();
    settle().await;

    carol.request_sessions().await.unwrap();
    settle().await;
    carol.join_session(&session_id, "Carol").await.unwrap();
    settle().await;

    // Only the member in the second roster slot is backup.
    assert_eq!(bob.role().await, PeerRole::BackupHost);
    assert_eq!(carol.role().await, PeerRole::Client);
    assert_eq!(alice.role().await, PeerRole::Host);
    assert_eq!(alice.roster().await.len(), 3);
    assert_eq!(carol.roster().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_roster_broadcast_is_idempotent() {
    let mesh = MemoryMesh::new();
    let (bob, _host, session_id) =
        backup_under_scripted_host(&mesh).await;

    let before = bob.roster().await;
    let updates_before = bob.observer().roster_updates();

    // The identical broadcast again: same final state.
    bob.dispatch(roster_broadcast(
        &session_id,
        vec![
            Member::new(pid("scripted-host"), "Host"),
            Member::new(pid("bob"), "Bob"),
        ],
    ))
    .await
    .unwrap();

    assert_eq!(bob.roster().await, before);
    assert_eq!(bob.role().await, PeerRole::BackupHost);
    // The observer still hears about the (unchanged) roster.
    assert_eq!(bob.observer().roster_updates(), updates_before + 1);
}

// =========================================================================
// Ping state machine
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_answered_pings_keep_host_alive() {
    let mesh = MemoryMesh::new();
    let (bob, _host, _session_id) =
        backup_under_scripted_host(&mesh).await;

    // Several full cycles with an answering host: no takeover.
    tokio::time::sleep(Duration::from_millis(4800)).await;

    assert_eq!(bob.role().await, PeerRole::BackupHost);
    assert!(bob.host_active().await);
}

#[tokio::test(start_paused = true)]
async fn test_failover_after_exactly_five_misses_and_no_sooner() {
    let mesh = MemoryMesh::new();
    let (bob, host, _session_id) =
        backup_under_scripted_host(&mesh).await;
    host.set_answering(false);

    // Probe k fires at +1000k ms, its grace check at +1000k+500 ms; the
    // fifth consecutive miss lands at +5500 ms. Just before it: still
    // backup.
    tokio::time::sleep(Duration::from_millis(5300)).await;
    assert_eq!(bob.role().await, PeerRole::BackupHost);

    // Just after: host.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(bob.role().await, PeerRole::Host);
    assert_eq!(mesh.host().await, Some(pid("bob")));
}

#[tokio::test(start_paused = true)]
async fn test_single_answered_cycle_resets_the_miss_counter() {
    let mesh = MemoryMesh::new();
    let (bob, host, _session_id) =
        backup_under_scripted_host(&mesh).await;
    host.set_answering(false);

    // Three misses (+1500, +2500, +3500), then the host answers one
    // cycle (+4000/+4500), then goes silent for good.
    tokio::time::sleep(Duration::from_millis(3700)).await;
    assert_eq!(bob.role().await, PeerRole::BackupHost);
    host.set_answering(true);
    tokio::time::sleep(Duration::from_millis(1000)).await; // now +4700
    assert!(bob.host_active().await, "answered cycle restores the flag");
    host.set_answering(false);

    // Five fresh consecutive misses are needed: checks at +5500 through
    // +9500. At +9300 the counter is still at four.
    tokio::time::sleep(Duration::from_millis(4600)).await; // now +9300
    assert_eq!(bob.role().await, PeerRole::BackupHost);

    tokio::time::sleep(Duration::from_millis(700)).await; // now +10000
    assert_eq!(bob.role().await, PeerRole::Host);
}

// =========================================================================
// Promotion / handover
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_new_host_announces_and_next_member_takes_backup_role() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;
    let carol = spawn_peer(&mesh, "carol").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;
    let session_id = bob.discovered_sessions().await[0].session_id.clone();
    bob.join_session(&session_id, "Bob").await.unwrap();
    settle().await;
    carol.request_sessions().await.unwrap();
    settle().await;
    carol.join_session(&session_id, "Carol").await.unwrap();
    settle().await;
    assert_eq!(bob.role().await, PeerRole::BackupHost);

    // The host drops off the face of the earth.
    mesh.detach(&pid("alice")).await;
    tokio::time::sleep(Duration::from_secs(12)).await;

    // Bob took over; his announcement made Carol the new backup.
    assert_eq!(bob.role().await, PeerRole::Host);
    assert_eq!(mesh.host().await, Some(pid("bob")));
    assert_eq!(carol.role().await, PeerRole::BackupHost);

    // The new host answers Carol's pings: long after her miss limit
    // would have expired against a dead host, no cascading takeover.
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(carol.role().await, PeerRole::BackupHost);
    assert_eq!(bob.role().await, PeerRole::Host);

    // The roster survived the handover on every remaining peer.
    assert_eq!(bob.roster().await.len(), 3);
    assert_eq!(carol.roster().await, bob.roster().await);
}

#[tokio::test(start_paused = true)]
async fn test_announcement_promotes_only_the_announcers_successor() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;
    let carol = spawn_peer(&mesh, "carol").await;
    let dave = spawn_peer(&mesh, "dave").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    for (peer, name) in
        [(&bob, "Bob"), (&carol, "Carol"), (&dave, "Dave")]
    {
        peer.request_sessions().await.unwrap();
        settle().await;
        let session_id =
            peer.discovered_sessions().await[0].session_id.clone();
        peer.join_session(&session_id, name).await.unwrap();
        settle().await;
    }
    let session_id = alice.current_session_id().await.unwrap();

    // Roster is [alice, bob, carol, dave]; bob is already backup. An
    // announcement from alice designates bob — idempotent no-op.
    let spy = mesh.attach(pid("spy")).await;
    let announce = |origin: &str| Packet {
        header: PacketHeader {
            session_id: session_id.clone(),
            target: Target::Clients,
            origin: pid(origin),
        },
        payload: payload(&SessionMessage::NewBackupHost),
        handler_response: None,
    };
    spy.deliver(announce("alice")).await.unwrap();
    settle().await;

    assert_eq!(bob.role().await, PeerRole::BackupHost);
    assert_eq!(carol.role().await, PeerRole::Client);
    assert_eq!(dave.role().await, PeerRole::Client);

    // An announcement from bob designates carol, and only carol.
    spy.deliver(announce("bob")).await.unwrap();
    settle().await;

    assert_eq!(carol.role().await, PeerRole::BackupHost);
    assert_eq!(dave.role().await, PeerRole::Client);
}

#[tokio::test(start_paused = true)]
async fn test_announcement_from_last_member_promotes_nobody() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;
    let session_id = bob.discovered_sessions().await[0].session_id.clone();
    bob.join_session(&session_id, "Bob").await.unwrap();
    settle().await;

    // Bob is the last roster entry — an announcement from him has no
    // successor to designate. No wraparound back to the front.
    let spy = mesh.attach(pid("spy")).await;
    spy.deliver(Packet {
        header: PacketHeader {
            session_id,
            target: Target::Clients,
            origin: pid("bob"),
        },
        payload: payload(&SessionMessage::NewBackupHost),
        handler_response: None,
    })
    .await
    .unwrap();
    settle().await;

    assert_eq!(alice.role().await, PeerRole::Host);
    assert_eq!(bob.role().await, PeerRole::BackupHost);
}

#[tokio::test(start_paused = true)]
async fn test_host_addressed_announcement_is_relayed_to_clients() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;
    let session_id = bob.discovered_sessions().await[0].session_id.clone();
    bob.join_session(&session_id, "Bob").await.unwrap();
    settle().await;

    // A NewBackupHost that reaches the host slot gets re-broadcast so it
    // travels one hop further, origin preserved.
    let spy = mesh.attach(pid("spy")).await;
    spy.deliver(Packet {
        header: PacketHeader {
            session_id,
            target: Target::Host,
            origin: pid("original-announcer"),
        },
        payload: payload(&SessionMessage::NewBackupHost),
        handler_response: None,
    })
    .await
    .unwrap();
    settle().await;

    let relayed: Vec<Packet> = drain(&spy)
        .await
        .into_iter()
        .filter(|p| p.payload.contains("NewBackupHost"))
        .collect();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].header.target, Target::Clients);
    assert_eq!(relayed[0].header.origin, pid("original-announcer"));
}

// =========================================================================
// Heartbeats
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_host_records_member_heartbeats() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;
    let session_id = bob.discovered_sessions().await[0].session_id.clone();
    bob.join_session(&session_id, "Bob").await.unwrap();

    // Bob heartbeats every second; well within 3 intervals nothing is
    // stale.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(alice.stale_members().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silent_member_is_reported_stale_but_never_evicted() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;
    let session_id = bob.discovered_sessions().await[0].session_id.clone();
    bob.join_session(&session_id, "Bob").await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    // Bob vanishes; after 3× the heartbeat interval he shows up stale —
    // and stays on the roster (reporting only, no eviction).
    mesh.detach(&pid("bob")).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(alice.stale_members().await, vec![pid("bob")]);
    assert_eq!(alice.roster().await.len(), 2);
}

// =========================================================================
// Difficulty / spawn-rate replication
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_difficulty_edit_from_member_is_applied_and_rebroadcast_once()
{
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    bob.request_sessions().await.unwrap();
    settle().await;
    let session_id = bob.discovered_sessions().await[0].session_id.clone();
    bob.join_session(&session_id, "Bob").await.unwrap();
    settle().await;

    // A spy sees exactly what the host fans out.
    let spy = mesh.attach(pid("spy")).await;

    bob.edit_monster_difficulty(MonsterDifficulty::Hard)
        .await
        .unwrap();
    settle().await;

    // The host's store holds the parsed value.
    assert_eq!(
        alice.store().monster_difficulty(&session_id),
        Some(MonsterDifficulty::Hard)
    );
    // The backup host (bob) caught up from the echoed copy.
    assert_eq!(
        bob.store().monster_difficulty(&session_id),
        Some(MonsterDifficulty::Hard)
    );

    // Exactly one re-broadcast, carrying the original payload unchanged.
    let edits: Vec<Packet> = drain(&spy)
        .await
        .into_iter()
        .filter(|p| p.payload.contains("EditMonsterDifficulty"))
        .collect();
    assert_eq!(edits.len(), 1);
    assert_eq!(
        edits[0].payload,
        payload(&SessionMessage::EditMonsterDifficulty {
            difficulty: MonsterDifficulty::Hard
        })
    );
    assert!(edits[0].handler_response.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_plain_client_does_not_apply_replicated_edits() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    let bob = spawn_peer(&mesh, "bob").await;
    let carol = spawn_peer(&mesh, "carol").await;

    alice.create_session("Dungeon", "Alice").await.unwrap();
    for (peer, name) in [(&bob, "Bob"), (&carol, "Carol")] {
        peer.request_sessions().await.unwrap();
        settle().await;
        let session_id =
            peer.discovered_sessions().await[0].session_id.clone();
        peer.join_session(&session_id, name).await.unwrap();
        settle().await;
    }
    let session_id = alice.current_session_id().await.unwrap();

    carol
        .edit_item_spawn_rate(lobbymesh_protocol::ItemSpawnRate::High)
        .await
        .unwrap();
    settle().await;

    // Host applies, backup catches up, the plain client does not.
    use lobbymesh_protocol::ItemSpawnRate;
    assert_eq!(
        alice.store().item_spawn_rate(&session_id),
        Some(ItemSpawnRate::High)
    );
    assert_eq!(
        bob.store().item_spawn_rate(&session_id),
        Some(ItemSpawnRate::High)
    );
    assert_eq!(carol.store().item_spawn_rate(&session_id), None);
}

// =========================================================================
// Classification fall-through
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_packet_for_unknown_session_is_ignored() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    alice.create_session("Dungeon", "Alice").await.unwrap();

    // A heartbeat for a session we're not in falls through to Ignore.
    let outcome = alice
        .handle_packet(&Packet {
            header: PacketHeader {
                session_id: SessionId::new("some-other-session"),
                target: Target::Host,
                origin: pid("stranger"),
            },
            payload: payload(&SessionMessage::SendHeartbeat),
            handler_response: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome, lobbymesh_protocol::HandlerOutcome::ignore());
}

#[tokio::test(start_paused = true)]
async fn test_ping_fanned_out_to_clients_is_ignored() {
    let mesh = MemoryMesh::new();
    let alice = spawn_peer(&mesh, "alice").await;
    alice.create_session("Dungeon", "Alice").await.unwrap();
    let session_id = alice.current_session_id().await.unwrap();

    // Even the host ignores a ping addressed to the client fan-out.
    let outcome = alice
        .handle_packet(&Packet {
            header: PacketHeader {
                session_id,
                target: Target::Clients,
                origin: pid("someone"),
            },
            payload: payload(&SessionMessage::SendPing),
            handler_response: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome, lobbymesh_protocol::HandlerOutcome::ignore());
}

#[tokio::test(start_paused = true)]
async fn test_peer_without_session_ignores_discovery_requests() {
    let mesh = MemoryMesh::new();
    let idle = spawn_peer(&mesh, "idle").await;
    let bob = spawn_peer(&mesh, "bob").await;

    // Nobody hosts anything; a discovery broadcast goes unanswered.
    bob.request_sessions().await.unwrap();
    settle().await;

    assert!(bob.discovered_sessions().await.is_empty());
    assert!(idle.observer().discovered().is_empty());
}

// =========================================================================
// Helper: drain a spy endpoint without blocking
// =========================================================================

/// Collects every packet currently queued on a bare endpoint.
async fn drain(endpoint: &MeshEndpoint) -> Vec<Packet> {
    let mut packets = Vec::new();
    loop {
        match tokio::time::timeout(
            Duration::from_millis(1),
            endpoint.recv(),
        )
        .await
        {
            Ok(Ok(Some(packet))) => packets.push(packet),
            _ => break,
        }
    }
    packets
}
