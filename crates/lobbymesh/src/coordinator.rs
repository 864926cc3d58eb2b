//! The session coordinator: packet classification, protocol handlers,
//! and the ping/heartbeat workers.
//!
//! # Concurrency model
//!
//! Three workers touch session state concurrently: the inbound dispatch
//! loop ([`SessionCoordinator::run`]), the backup host's ping worker,
//! and the non-host heartbeat worker. All of them go through the single
//! `Mutex<CoordinatorState>` — there is no finer-grained locking, and no
//! path mutates roles or the roster outside that lock. The lock is never
//! held across a transport send or a sleep: handlers compute a
//! [`HandlerOutcome`] under the lock, release it, and only then
//! transmit.
//!
//! # Decide vs. transmit
//!
//! Every protocol handler returns an explicit [`HandlerOutcome`]
//! (`Ignore`, `ReturnToSender`, `SendToClients`); the coordinator alone
//! executes outcomes through the transport. When an outcome carries a
//! reply, the reply rides on the relayed packet's `handler_response`
//! slot so receivers read it without re-processing the request.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use lobbymesh_protocol::{
    Codec, HandlerOutcome, HandlerResponse, ItemSpawnRate, JsonCodec,
    Member, MonsterDifficulty, Packet, PacketHeader, PeerId,
    ProtocolError, SendAction, SessionId, SessionMessage, Target,
};
use lobbymesh_session::{
    DiscoveredSession, DiscoveryCache, HeartbeatTracker, Session,
    SessionError, generate_seed, generate_session_id,
};
use lobbymesh_timer::{Ticker, TickerHandle};
use lobbymesh_transport::Transport;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{GameConfigStore, LobbyError, LobbyObserver};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing and failure-detection knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How often the backup host probes the host.
    pub ping_interval: Duration,
    /// How long a probe waits for the host's answer before counting a
    /// miss.
    pub ping_grace: Duration,
    /// Consecutive unanswered probes before the host is declared dead.
    pub host_miss_limit: u32,
    /// How often a non-host member reports liveness to the host.
    pub heartbeat_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(1000),
            ping_grace: Duration::from_millis(500),
            host_miss_limit: 5,
            heartbeat_interval: Duration::from_millis(1000),
        }
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Which part a peer currently plays in its session. Exactly one role at
/// a time; exactly one host should exist per live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerRole {
    /// An ordinary member.
    #[default]
    Client,
    /// The designated successor: monitors host liveness, takes over on
    /// failure.
    BackupHost,
    /// The peer authoritative for membership and shared config state.
    Host,
}

impl PeerRole {
    /// `true` for [`PeerRole::Host`].
    pub fn is_host(self) -> bool {
        matches!(self, PeerRole::Host)
    }

    /// `true` for [`PeerRole::BackupHost`].
    pub fn is_backup(self) -> bool {
        matches!(self, PeerRole::BackupHost)
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Everything the protocol mutates, behind one lock.
struct CoordinatorState {
    session: Option<Session>,
    role: PeerRole,
    discovery: DiscoveryCache,
    /// Present exactly while this peer holds the host role.
    heartbeats: Option<HeartbeatTracker>,
    /// Cleared when a probe goes out, restored by the host's answer.
    host_active: bool,
    /// Consecutive unanswered probe cycles.
    host_misses: u32,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            session: None,
            role: PeerRole::Client,
            discovery: DiscoveryCache::new(),
            heartbeats: None,
            host_active: true,
            host_misses: 0,
        }
    }
}

/// A spawned worker loop and its stop switch.
struct Worker {
    handle: JoinHandle<()>,
    stop: TickerHandle,
}

/// What one probe cycle concluded about the host.
enum PingVerdict {
    /// The host answered within the grace window.
    Alive,
    /// No answer, but the miss limit isn't reached yet.
    Missed,
    /// The miss limit is reached — trigger failover.
    Dead,
    /// This peer is no longer backup (or has no session); nothing to do.
    Skipped,
}

/// Coordinates one peer's participation in a session group.
///
/// Generic over the transport `T`, the game-configuration store `S`, and
/// the presentation observer `O`. Wrap it in an [`Arc`] and spawn
/// [`run`](Self::run) to start dispatching inbound packets.
pub struct SessionCoordinator<T, S, O> {
    transport: T,
    store: S,
    observer: O,
    config: CoordinatorConfig,
    codec: JsonCodec,
    state: Mutex<CoordinatorState>,
    // Worker slots use std mutexes: they are touched only from sync
    // code and never held across an await.
    heartbeat_worker: StdMutex<Option<Worker>>,
    ping_worker: StdMutex<Option<Worker>>,
    side_task: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T, S, O> SessionCoordinator<T, S, O>
where
    T: Transport,
    S: GameConfigStore,
    O: LobbyObserver,
{
    /// Creates a coordinator with default timing
    /// ([`CoordinatorConfig::default`]).
    pub fn new(transport: T, store: S, observer: O) -> Self {
        Self {
            transport,
            store,
            observer,
            config: CoordinatorConfig::default(),
            codec: JsonCodec,
            state: Mutex::new(CoordinatorState::new()),
            heartbeat_worker: StdMutex::new(None),
            ping_worker: StdMutex::new(None),
            side_task: None,
        }
    }

    /// Overrides the timing configuration.
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a fire-and-forget task spawned once at session
    /// creation (e.g. kicking off background world preparation). The
    /// coordinator never consumes a result from it.
    pub fn with_side_task(
        mut self,
        task: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.side_task = Some(Arc::new(task));
        self
    }

    /// The transport this coordinator speaks through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The game-configuration store edits are applied to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The presentation observer.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    // -----------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------

    /// Runs the inbound dispatch loop until the transport shuts down.
    ///
    /// Spawn this once per coordinator:
    /// `tokio::spawn(Arc::clone(&coordinator).run())`.
    pub async fn run(self: Arc<Self>) -> Result<(), LobbyError> {
        while let Some(packet) = self.transport.recv().await? {
            if let Err(error) = self.dispatch(packet).await {
                warn!(%error, "packet dispatch failed");
            }
        }
        debug!("transport closed, dispatch loop exiting");
        Ok(())
    }

    /// Creates a new session with this peer as host and sole member.
    ///
    /// Generates a fresh session id and world seed, switches the
    /// transport's routing to this peer, starts liveness tracking, and
    /// fires the registered side task. Returns whether the session is
    /// active (always `true` on success).
    pub async fn create_session(
        self: &Arc<Self>,
        session_name: &str,
        user_name: &str,
    ) -> Result<bool, LobbyError> {
        let own = self.transport.local_peer();
        let session_id = generate_session_id();
        let seed = generate_seed();
        let session = Session::host(
            session_id.clone(),
            session_name,
            seed,
            Member::new(own.clone(), user_name),
        );

        self.transport.assume_host().await?;

        let roster = session.roster().to_vec();
        {
            let mut state = self.state.lock().await;
            state.role = PeerRole::Host;
            state.heartbeats = Some(HeartbeatTracker::new(
                session.peers_except(&own),
                self.config.heartbeat_interval,
            ));
            state.session = Some(session);
        }

        if let Some(task) = &self.side_task {
            let task = Arc::clone(task);
            tokio::task::spawn_blocking(move || task());
        }

        self.observer.on_roster_changed(&roster);
        self.observer.on_status(&format!(
            "Created session with the name: {session_name}"
        ));
        info!(%session_id, seed, "session created");
        Ok(true)
    }

    /// Joins a previously discovered session.
    ///
    /// Requires a cached discovery response for `session_id`; without
    /// one this reports "Could not find game!" and returns `false`
    /// without emitting anything. On success the heartbeat worker
    /// starts, a local session is built from the cached response, and a
    /// join request goes to the host.
    pub async fn join_session(
        self: &Arc<Self>,
        session_id: &SessionId,
        user_name: &str,
    ) -> Result<bool, LobbyError> {
        let own = self.transport.local_peer();
        let discovered = {
            let state = self.state.lock().await;
            state
                .discovery
                .get(session_id)
                .map(|d| (d.name.clone(), d.seed))
        };
        let Some((name, seed)) = discovered else {
            self.observer.on_status("Could not find game!");
            return Ok(false);
        };

        // Keep the host informed we're alive from the moment we join.
        self.start_heartbeat_worker();

        {
            let mut state = self.state.lock().await;
            state.role = PeerRole::Client;
            state.session =
                Some(Session::joined(session_id.clone(), &name, seed));
            state.heartbeats = None;
            state.host_active = true;
            state.host_misses = 0;
        }
        self.observer
            .on_status(&format!("Joined game with name: {name}"));

        let join = SessionMessage::RequestToJoinSession {
            seed,
            roster: vec![Member::new(own, user_name)],
        };
        self.send_to_host(session_id, &join).await?;
        info!(%session_id, "join request sent");
        Ok(true)
    }

    /// Broadcasts a discovery request. Hosts of other sessions answer
    /// with their session summary, which lands in the discovery cache
    /// and is forwarded to the observer.
    pub async fn request_sessions(&self) -> Result<(), LobbyError> {
        // A discovery request carries no meaningful session id of its
        // own; receivers only look at the message kind and target.
        let session_id = self
            .current_session_id()
            .await
            .unwrap_or_else(|| SessionId::new(""));
        let packet = Packet {
            header: PacketHeader {
                session_id,
                target: Target::Clients,
                origin: self.transport.local_peer(),
            },
            payload: self.encode_message(&SessionMessage::RequestSessions)?,
            handler_response: None,
        };
        Ok(self.transport.deliver(packet).await?)
    }

    /// Replicates a difficulty edit: the host applies and re-broadcasts
    /// it; a client sends it to the host for replication.
    pub async fn edit_monster_difficulty(
        &self,
        difficulty: MonsterDifficulty,
    ) -> Result<(), LobbyError> {
        let message = SessionMessage::EditMonsterDifficulty { difficulty };
        let (session_id, is_host) = self.session_id_and_role().await?;
        if is_host {
            self.store.set_monster_difficulty(&session_id, difficulty);
            self.broadcast_with_echo(&session_id, &message).await
        } else {
            self.send_to_host(&session_id, &message).await
        }
    }

    /// Replicates a spawn-rate edit, like
    /// [`edit_monster_difficulty`](Self::edit_monster_difficulty).
    pub async fn edit_item_spawn_rate(
        &self,
        spawn_rate: ItemSpawnRate,
    ) -> Result<(), LobbyError> {
        let message = SessionMessage::EditItemSpawnRate { spawn_rate };
        let (session_id, is_host) = self.session_id_and_role().await?;
        if is_host {
            self.store.set_item_spawn_rate(&session_id, spawn_rate);
            self.observer
                .on_status(&format!("Spawn rate set to {spawn_rate}"));
            self.broadcast_with_echo(&session_id, &message).await
        } else {
            self.send_to_host(&session_id, &message).await
        }
    }

    /// Stops both workers. Heartbeat shutdown waits for the worker to
    /// exit; ping shutdown is fire-and-forget.
    pub async fn shutdown(&self) {
        self.stop_ping_worker();
        self.stop_heartbeat_worker().await;
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// This peer's current role.
    pub async fn role(&self) -> PeerRole {
        self.state.lock().await.role
    }

    /// Whether this peer considers itself in an active session.
    pub async fn in_session(&self) -> bool {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .is_some_and(|s| s.is_active())
    }

    /// The current session id, if any.
    pub async fn current_session_id(&self) -> Option<SessionId> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.session_id().clone())
    }

    /// The current session's world seed, if any.
    pub async fn session_seed(&self) -> Option<i64> {
        self.state.lock().await.session.as_ref().map(|s| s.seed())
    }

    /// A snapshot of the current roster.
    pub async fn roster(&self) -> Vec<Member> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.roster().to_vec())
            .unwrap_or_default()
    }

    /// Whether the host answered the most recent probe window. Only
    /// meaningful on the backup host.
    pub async fn host_active(&self) -> bool {
        self.state.lock().await.host_active
    }

    /// Sessions discovered so far.
    pub async fn discovered_sessions(&self) -> Vec<DiscoveredSession> {
        self.state
            .lock()
            .await
            .discovery
            .sessions()
            .cloned()
            .collect()
    }

    /// Members that stopped heartbeating, as of now. Empty unless this
    /// peer is host. Reporting only — nothing evicts a stale member.
    pub async fn stale_members(&self) -> Vec<PeerId> {
        self.state
            .lock()
            .await
            .heartbeats
            .as_ref()
            .map(|t| t.stale_peers(Instant::now()))
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------
    // Packet classification
    // -----------------------------------------------------------------

    /// Classifies an inbound packet and runs the matching handler.
    ///
    /// The rules, evaluated in order: packets for *our* session are
    /// routed by message kind and target (fan-out kinds accept
    /// `host`/`client` targets; kinds that can be unicast back also
    /// accept our own peer id). Packets for a different or unknown
    /// session are discovery traffic: a broadcast `RequestSessions` gets
    /// our session summary, one addressed to us specifically *is* a
    /// discovery result. Everything else falls through to `Ignore`.
    pub async fn handle_packet(
        self: &Arc<Self>,
        packet: &Packet,
    ) -> Result<HandlerOutcome, LobbyError> {
        let message = self.decode_message(&packet.payload)?;
        let own = self.transport.local_peer();
        let mut state = self.state.lock().await;

        let same_session = state
            .session
            .as_ref()
            .is_some_and(|s| s.session_id() == &packet.header.session_id);
        let fanout = packet.header.target.is_fanout();
        let addressed_here = fanout || packet.header.target.is_peer(&own);

        if same_session {
            match message {
                SessionMessage::RequestToJoinSession { roster, .. }
                    if fanout =>
                {
                    self.handle_join(&mut state, packet, roster)
                }
                SessionMessage::SendHeartbeat if fanout => {
                    Ok(self.handle_heartbeat(&mut state, packet))
                }
                SessionMessage::NewBackupHost if fanout => {
                    self.handle_new_backup_host(&mut state, packet)
                }
                SessionMessage::EditMonsterDifficulty { difficulty }
                    if addressed_here =>
                {
                    self.handle_monster_difficulty(
                        &mut state, packet, difficulty,
                    )
                }
                SessionMessage::EditItemSpawnRate { spawn_rate }
                    if addressed_here =>
                {
                    self.handle_item_spawn_rate(
                        &mut state, packet, spawn_rate,
                    )
                }
                SessionMessage::SendPing if addressed_here => {
                    self.handle_ping(&mut state, packet)
                }
                _ => Ok(HandlerOutcome::ignore()),
            }
        } else {
            match message {
                SessionMessage::RequestSessions if fanout => {
                    self.handle_request_sessions(&state)
                }
                SessionMessage::RequestSessions
                    if packet.header.target.is_peer(&own) =>
                {
                    self.handle_discovery_result(&mut state, packet)
                }
                _ => Ok(HandlerOutcome::ignore()),
            }
        }
    }

    /// Classifies, handles, and executes the resulting outcome.
    pub async fn dispatch(
        self: &Arc<Self>,
        packet: Packet,
    ) -> Result<(), LobbyError> {
        let outcome = self.handle_packet(&packet).await?;
        self.execute(&packet, outcome).await
    }

    /// Executes a handler outcome through the transport. The computed
    /// reply (if any) rides as `handler_response` on a copy of the
    /// inbound packet; `SendToClients` preserves the inbound origin
    /// because successor computations on the receiving side key off it.
    async fn execute(
        &self,
        inbound: &Packet,
        outcome: HandlerOutcome,
    ) -> Result<(), LobbyError> {
        match outcome.action {
            SendAction::Ignore => Ok(()),
            SendAction::ReturnToSender => {
                let session_id = self
                    .current_session_id()
                    .await
                    .unwrap_or_else(|| inbound.header.session_id.clone());
                let reply = Packet {
                    header: PacketHeader {
                        session_id,
                        target: Target::Peer(inbound.header.origin.clone()),
                        origin: self.transport.local_peer(),
                    },
                    payload: inbound.payload.clone(),
                    handler_response: outcome.payload.map(
                        |result_message| HandlerResponse { result_message },
                    ),
                };
                Ok(self.transport.deliver(reply).await?)
            }
            SendAction::SendToClients => {
                let broadcast = Packet {
                    header: PacketHeader {
                        session_id: inbound.header.session_id.clone(),
                        target: Target::Clients,
                        origin: inbound.header.origin.clone(),
                    },
                    payload: inbound.payload.clone(),
                    handler_response: outcome.payload.map(
                        |result_message| HandlerResponse { result_message },
                    ),
                };
                Ok(self.transport.deliver(broadcast).await?)
            }
        }
    }

    // -----------------------------------------------------------------
    // Protocol handlers
    // -----------------------------------------------------------------

    /// `RequestToJoinSession`, both directions.
    ///
    /// Host side: merge the joiner and broadcast the *entire* roster
    /// plus the immutable seed — full-roster broadcasts make resync
    /// idempotent and tolerate lost or reordered joins. Client side:
    /// replace the roster wholesale with the copy riding in
    /// `handler_response`, then self-promote to backup if the second
    /// roster slot is ours.
    fn handle_join(
        self: &Arc<Self>,
        state: &mut CoordinatorState,
        packet: &Packet,
        roster: Vec<Member>,
    ) -> Result<HandlerOutcome, LobbyError> {
        let own = self.transport.local_peer();

        if state.role.is_host() {
            let session = state
                .session
                .as_mut()
                .ok_or(SessionError::NotInSession)?;
            let member = roster.into_iter().next().ok_or_else(|| {
                ProtocolError::InvalidMessage(
                    "join request with empty roster".into(),
                )
            })?;
            session.add_member(member);

            let sync = SessionMessage::RequestToJoinSession {
                seed: session.seed(),
                roster: session.roster().to_vec(),
            };
            let snapshot = session.roster().to_vec();
            let payload = self.encode_message(&sync)?;
            self.observer.on_roster_changed(&snapshot);
            return Ok(HandlerOutcome::broadcast(payload));
        }

        // Client side: the authoritative roster rides in the relayed
        // response, not the request payload.
        let Some(response) = &packet.handler_response else {
            return Ok(HandlerOutcome::ignore());
        };
        let SessionMessage::RequestToJoinSession { roster, .. } =
            self.decode_message(&response.result_message)?
        else {
            return Err(ProtocolError::InvalidMessage(
                "membership broadcast with mismatched payload".into(),
            )
            .into());
        };

        let (snapshot, designated) = {
            let session = state
                .session
                .as_mut()
                .ok_or(SessionError::NotInSession)?;
            session.replace_roster(roster);
            let designated = session
                .backup_candidate()
                .is_some_and(|m| m.peer_id == own);
            (session.roster().to_vec(), designated)
        };

        if designated && !state.role.is_backup() && !state.role.is_host() {
            self.promote_to_backup(state);
        }
        self.observer.on_roster_changed(&snapshot);
        Ok(HandlerOutcome::ignore())
    }

    /// `SendHeartbeat`: the host records the sender; everyone else has
    /// no tracker and drops it.
    fn handle_heartbeat(
        &self,
        state: &mut CoordinatorState,
        packet: &Packet,
    ) -> HandlerOutcome {
        if let Some(tracker) = state.heartbeats.as_mut() {
            tracker.record(packet.header.origin.clone());
        }
        HandlerOutcome::ignore()
    }

    /// `NewBackupHost`: relay if addressed to the host slot, otherwise
    /// promote ourselves when we're the member right after the
    /// announcer. An announcer that is last in the roster has no
    /// successor — nothing happens.
    fn handle_new_backup_host(
        self: &Arc<Self>,
        state: &mut CoordinatorState,
        packet: &Packet,
    ) -> Result<HandlerOutcome, LobbyError> {
        if packet.header.target == Target::Host {
            // Relay one hop further so peers the announcer can't reach
            // directly still hear it.
            return Ok(HandlerOutcome::relay());
        }

        let own = self.transport.local_peer();
        let next_in_line = {
            let session = state
                .session
                .as_ref()
                .ok_or(SessionError::NotInSession)?;
            match session.successor_of(&packet.header.origin) {
                Some(member) => member.peer_id == own,
                None => {
                    debug!(
                        origin = %packet.header.origin,
                        "announcer has no successor in the roster"
                    );
                    false
                }
            }
        };

        if next_in_line && !state.role.is_backup() && !state.role.is_host()
        {
            self.promote_to_backup(state);
        }
        Ok(HandlerOutcome::ignore())
    }

    /// `SendPing`: a reply carrying a `handler_response` means the host
    /// answered our probe; a fresh probe is answered if we are the host;
    /// a probe fanned out to `client` is not ours to answer.
    fn handle_ping(
        &self,
        state: &mut CoordinatorState,
        packet: &Packet,
    ) -> Result<HandlerOutcome, LobbyError> {
        if packet.header.target == Target::Clients {
            return Ok(HandlerOutcome::ignore());
        }
        if packet.handler_response.is_some() {
            state.host_active = true;
            return Ok(HandlerOutcome::ignore());
        }
        if state.role.is_host() {
            let pong = self
                .encode_message(&SessionMessage::ReceivedPingResponse)?;
            return Ok(HandlerOutcome::reply(pong));
        }
        Ok(HandlerOutcome::ignore())
    }

    /// `EditMonsterDifficulty`: the host applies and re-broadcasts the
    /// raw payload; the backup host applies the echoed copy without
    /// re-broadcasting (it is catching up to a value the host already
    /// distributed); plain clients ignore.
    fn handle_monster_difficulty(
        &self,
        state: &mut CoordinatorState,
        packet: &Packet,
        difficulty: MonsterDifficulty,
    ) -> Result<HandlerOutcome, LobbyError> {
        let session_id = state
            .session
            .as_ref()
            .ok_or(SessionError::NotInSession)?
            .session_id()
            .clone();

        if state.role.is_host() {
            self.store.set_monster_difficulty(&session_id, difficulty);
            return Ok(HandlerOutcome::broadcast(packet.payload.clone()));
        }
        if state.role.is_backup() {
            if let Some(response) = &packet.handler_response {
                let SessionMessage::EditMonsterDifficulty { difficulty } =
                    self.decode_message(&response.result_message)?
                else {
                    return Err(ProtocolError::InvalidMessage(
                        "echoed difficulty edit with mismatched payload"
                            .into(),
                    )
                    .into());
                };
                self.store
                    .set_monster_difficulty(&session_id, difficulty);
            }
        }
        Ok(HandlerOutcome::ignore())
    }

    /// `EditItemSpawnRate`: same replication shape as the difficulty
    /// edit.
    fn handle_item_spawn_rate(
        &self,
        state: &mut CoordinatorState,
        packet: &Packet,
        spawn_rate: ItemSpawnRate,
    ) -> Result<HandlerOutcome, LobbyError> {
        let session_id = state
            .session
            .as_ref()
            .ok_or(SessionError::NotInSession)?
            .session_id()
            .clone();

        if state.role.is_host() {
            self.observer
                .on_status(&format!("Spawn rate set to {spawn_rate}"));
            self.store.set_item_spawn_rate(&session_id, spawn_rate);
            return Ok(HandlerOutcome::broadcast(packet.payload.clone()));
        }
        if state.role.is_backup() {
            if let Some(response) = &packet.handler_response {
                let SessionMessage::EditItemSpawnRate { spawn_rate } =
                    self.decode_message(&response.result_message)?
                else {
                    return Err(ProtocolError::InvalidMessage(
                        "echoed spawn-rate edit with mismatched payload"
                            .into(),
                    )
                    .into());
                };
                self.observer
                    .on_status(&format!("Spawn rate set to {spawn_rate}"));
                self.store.set_item_spawn_rate(&session_id, spawn_rate);
            }
        }
        Ok(HandlerOutcome::ignore())
    }

    /// A discovery broadcast from a peer outside our session: answer
    /// with our session summary. A peer with no session has nothing to
    /// advertise.
    fn handle_request_sessions(
        &self,
        state: &CoordinatorState,
    ) -> Result<HandlerOutcome, LobbyError> {
        let Some(session) = state.session.as_ref() else {
            return Ok(HandlerOutcome::ignore());
        };
        let response = SessionMessage::RequestSessionsResponse {
            name: session.name().to_owned(),
            seed: session.seed(),
            roster: session.roster().to_vec(),
        };
        Ok(HandlerOutcome::reply(self.encode_message(&response)?))
    }

    /// A discovery result addressed to us: cache it (first write wins)
    /// and surface it to the presentation layer.
    fn handle_discovery_result(
        &self,
        state: &mut CoordinatorState,
        packet: &Packet,
    ) -> Result<HandlerOutcome, LobbyError> {
        let Some(response) = &packet.handler_response else {
            return Ok(HandlerOutcome::ignore());
        };
        let SessionMessage::RequestSessionsResponse { name, seed, roster } =
            self.decode_message(&response.result_message)?
        else {
            return Err(ProtocolError::InvalidMessage(
                "discovery result with mismatched payload".into(),
            )
            .into());
        };

        let discovered = DiscoveredSession {
            session_id: packet.header.session_id.clone(),
            name,
            seed,
            roster,
        };
        state.discovery.insert(discovered.clone());
        self.observer.on_session_discovered(&discovered);
        Ok(HandlerOutcome::ignore())
    }

    // -----------------------------------------------------------------
    // Role transitions
    // -----------------------------------------------------------------

    /// Flips this peer to backup host and starts the ping worker. The
    /// caller has already verified we are neither backup nor host —
    /// promotion is monotonic per role epoch, so a duplicate
    /// announcement cannot double-promote.
    fn promote_to_backup(
        self: &Arc<Self>,
        state: &mut CoordinatorState,
    ) {
        state.role = PeerRole::BackupHost;
        state.host_active = true;
        state.host_misses = 0;
        self.start_ping_worker();
        info!("designated backup host, watching host liveness");
        self.observer.on_status("You are the backup host now");
    }

    /// Takes over as host after the ping loop declared the host dead.
    ///
    /// Stops our own heartbeat reporting (join-style, so the handover is
    /// synchronous from here), rebuilds the heartbeat tracker over the
    /// remaining members, and announces `NewBackupHost` so the next
    /// member in roster order takes over the backup role.
    async fn promote_to_host(
        self: &Arc<Self>,
    ) -> Result<(), LobbyError> {
        info!("host unreachable, taking over as session host");
        self.transport.assume_host().await?;
        self.stop_ping_worker();
        self.stop_heartbeat_worker().await;

        let own = self.transport.local_peer();
        let session_id = {
            let mut state = self.state.lock().await;
            state.role = PeerRole::Host;
            state.host_active = true;
            state.host_misses = 0;
            let session = state
                .session
                .as_ref()
                .ok_or(SessionError::NotInSession)?;
            let expected = session.peers_except(&own);
            let session_id = session.session_id().clone();
            state.heartbeats = Some(HeartbeatTracker::new(
                expected,
                self.config.heartbeat_interval,
            ));
            session_id
        };

        self.observer
            .on_status("Host offline — this peer is the session host now");

        let announce = Packet {
            header: PacketHeader {
                session_id,
                target: Target::Clients,
                origin: own,
            },
            payload: self.encode_message(&SessionMessage::NewBackupHost)?,
            handler_response: None,
        };
        Ok(self.transport.deliver(announce).await?)
    }

    // -----------------------------------------------------------------
    // Workers
    // -----------------------------------------------------------------

    /// Starts the heartbeat worker if it isn't already running.
    fn start_heartbeat_worker(self: &Arc<Self>) {
        let mut slot = self
            .heartbeat_worker
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        let (mut ticker, stop) =
            Ticker::new(self.config.heartbeat_interval);
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while ticker.tick().await {
                if let Err(error) = coordinator.send_heartbeat().await {
                    debug!(%error, "heartbeat send failed");
                }
            }
            debug!("heartbeat worker stopped");
        });
        *slot = Some(Worker { handle, stop });
    }

    /// Stops the heartbeat worker and waits for it to exit, so callers
    /// know no further heartbeats go out once this returns.
    async fn stop_heartbeat_worker(&self) {
        let worker = self
            .heartbeat_worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            worker.stop.stop();
            if let Err(error) = worker.handle.await {
                debug!(%error, "heartbeat worker ended abnormally");
            }
        }
    }

    /// One heartbeat, skipped while not an active non-host member.
    async fn send_heartbeat(&self) -> Result<(), LobbyError> {
        let session_id = {
            let state = self.state.lock().await;
            match &state.session {
                Some(session)
                    if session.is_active() && !state.role.is_host() =>
                {
                    session.session_id().clone()
                }
                _ => return Ok(()),
            }
        };
        self.send_to_host(&session_id, &SessionMessage::SendHeartbeat)
            .await
    }

    /// Starts the ping worker if it isn't already running. Only the
    /// backup host runs this loop.
    fn start_ping_worker(self: &Arc<Self>) {
        let mut slot =
            self.ping_worker.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        let (mut ticker, stop) = Ticker::new(self.config.ping_interval);
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while ticker.tick().await {
                match coordinator.ping_cycle().await {
                    Ok(PingVerdict::Dead) => {
                        if let Err(error) =
                            coordinator.promote_to_host().await
                        {
                            warn!(%error, "host takeover failed");
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        debug!(%error, "ping cycle failed");
                    }
                }
            }
            debug!("ping worker stopped");
        });
        *slot = Some(Worker { handle, stop });
    }

    /// Stops the ping worker without waiting — once the host is
    /// confirmed dead no further replies are expected.
    fn stop_ping_worker(&self) {
        if let Some(worker) = self
            .ping_worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            worker.stop.stop();
        }
    }

    /// One probe cycle: send a ping with the liveness flag cleared, wait
    /// out the grace window (inbound dispatch keeps running and may
    /// restore the flag), then check. An answered cycle resets the miss
    /// counter; the `host_miss_limit`-th consecutive miss is the
    /// failover trigger.
    async fn ping_cycle(&self) -> Result<PingVerdict, LobbyError> {
        let session_id = {
            let mut state = self.state.lock().await;
            if !state.role.is_backup() {
                return Ok(PingVerdict::Skipped);
            }
            let Some(session) = state.session.as_ref() else {
                return Ok(PingVerdict::Skipped);
            };
            let session_id = session.session_id().clone();
            state.host_active = false;
            session_id
        };

        self.send_to_host(&session_id, &SessionMessage::SendPing)
            .await?;
        tokio::time::sleep(self.config.ping_grace).await;

        let mut state = self.state.lock().await;
        if state.host_active {
            state.host_misses = 0;
            return Ok(PingVerdict::Alive);
        }
        state.host_misses += 1;
        warn!(
            misses = state.host_misses,
            limit = self.config.host_miss_limit,
            "host did not answer ping"
        );
        if state.host_misses >= self.config.host_miss_limit {
            state.host_active = true;
            state.host_misses = 0;
            return Ok(PingVerdict::Dead);
        }
        Ok(PingVerdict::Missed)
    }

    // -----------------------------------------------------------------
    // Wire helpers
    // -----------------------------------------------------------------

    /// Sends a message to the session host.
    async fn send_to_host(
        &self,
        session_id: &SessionId,
        message: &SessionMessage,
    ) -> Result<(), LobbyError> {
        let packet = Packet {
            header: PacketHeader {
                session_id: session_id.clone(),
                target: Target::Host,
                origin: self.transport.local_peer(),
            },
            payload: self.encode_message(message)?,
            handler_response: None,
        };
        Ok(self.transport.deliver(packet).await?)
    }

    /// Broadcasts a message to all clients with the same message echoed
    /// in `handler_response`, the shape the backup host catches up from.
    async fn broadcast_with_echo(
        &self,
        session_id: &SessionId,
        message: &SessionMessage,
    ) -> Result<(), LobbyError> {
        let payload = self.encode_message(message)?;
        let packet = Packet {
            header: PacketHeader {
                session_id: session_id.clone(),
                target: Target::Clients,
                origin: self.transport.local_peer(),
            },
            payload: payload.clone(),
            handler_response: Some(HandlerResponse {
                result_message: payload,
            }),
        };
        Ok(self.transport.deliver(packet).await?)
    }

    /// The current session id and whether we host it; errors when not
    /// in a session at all.
    async fn session_id_and_role(
        &self,
    ) -> Result<(SessionId, bool), LobbyError> {
        let state = self.state.lock().await;
        let session =
            state.session.as_ref().ok_or(SessionError::NotInSession)?;
        Ok((session.session_id().clone(), state.role.is_host()))
    }

    fn encode_message(
        &self,
        message: &SessionMessage,
    ) -> Result<String, LobbyError> {
        let bytes = self.codec.encode(message)?;
        String::from_utf8(bytes).map_err(|error| {
            LobbyError::Protocol(ProtocolError::InvalidMessage(format!(
                "payload is not utf-8: {error}"
            )))
        })
    }

    fn decode_message(
        &self,
        payload: &str,
    ) -> Result<SessionMessage, LobbyError> {
        Ok(self.codec.decode(payload.as_bytes())?)
    }
}
