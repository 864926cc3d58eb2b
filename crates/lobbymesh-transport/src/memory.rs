//! In-memory mesh transport for tests and demos.
//!
//! A [`MemoryMesh`] is an in-process hub: every attached peer gets a
//! [`MeshEndpoint`] with its own unbounded inbox. Routing follows the
//! packet target — host, all clients, or one peer. Detaching a peer
//! makes traffic addressed to it vanish; detaching the *host* makes
//! host-targeted sends vanish, which is exactly the silence the backup
//! host's ping loop is built to detect.

use std::collections::HashMap;
use std::sync::Arc;

use lobbymesh_protocol::{Packet, PeerId, Target};
use tokio::sync::{Mutex, mpsc};

use crate::{Transport, TransportError};

#[derive(Default)]
struct MeshInner {
    peers: HashMap<PeerId, mpsc::UnboundedSender<Packet>>,
    host: Option<PeerId>,
}

impl MeshInner {
    /// Sends to one peer, dropping the packet if the peer is gone.
    fn send_to(&self, peer: &PeerId, packet: Packet) {
        if let Some(tx) = self.peers.get(peer) {
            let _ = tx.send(packet);
        }
    }
}

/// An in-process hub connecting a group of peers.
///
/// Cheap to clone — all clones share the same peer registry.
#[derive(Clone, Default)]
pub struct MemoryMesh {
    inner: Arc<Mutex<MeshInner>>,
}

impl MemoryMesh {
    /// Creates an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a peer and returns its endpoint.
    ///
    /// Re-attaching an id replaces the previous endpoint's inbox; the
    /// old endpoint stops receiving.
    pub async fn attach(&self, peer: PeerId) -> MeshEndpoint {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        inner.peers.insert(peer.clone(), tx);
        tracing::debug!(peer_id = %peer, peers = inner.peers.len(), "peer attached");
        MeshEndpoint {
            peer,
            mesh: Arc::clone(&self.inner),
            inbox: Mutex::new(rx),
        }
    }

    /// Removes a peer; packets addressed to it are dropped from now on.
    /// Detaching the current host leaves host-targeted traffic with
    /// nowhere to go — the mesh equivalent of a host crash.
    pub async fn detach(&self, peer: &PeerId) {
        let mut inner = self.inner.lock().await;
        inner.peers.remove(peer);
        if inner.host.as_ref() == Some(peer) {
            inner.host = None;
        }
        tracing::debug!(peer_id = %peer, "peer detached");
    }

    /// The peer currently routing as host, if any.
    pub async fn host(&self) -> Option<PeerId> {
        self.inner.lock().await.host.clone()
    }

    /// Number of attached peers.
    pub async fn peer_count(&self) -> usize {
        self.inner.lock().await.peers.len()
    }
}

/// One peer's endpoint on a [`MemoryMesh`].
pub struct MeshEndpoint {
    peer: PeerId,
    mesh: Arc<Mutex<MeshInner>>,
    inbox: Mutex<mpsc::UnboundedReceiver<Packet>>,
}

impl Transport for MeshEndpoint {
    fn local_peer(&self) -> PeerId {
        self.peer.clone()
    }

    async fn deliver(&self, packet: Packet) -> Result<(), TransportError> {
        let inner = self.mesh.lock().await;
        match &packet.header.target {
            Target::Host => {
                // No host attached: the packet is dropped. That silence
                // is what the backup host's ping loop detects.
                if let Some(host) = inner.host.clone() {
                    if host != self.peer {
                        inner.send_to(&host, packet);
                    }
                }
            }
            Target::Clients => {
                // Fan out to every peer but the sender. The packet's
                // origin may differ from the sender when a reply is
                // being relayed; the origin still receives the copy.
                let targets: Vec<PeerId> = inner
                    .peers
                    .keys()
                    .filter(|p| **p != self.peer)
                    .cloned()
                    .collect();
                for peer in targets {
                    inner.send_to(&peer, packet.clone());
                }
            }
            Target::Peer(peer) => {
                let peer = peer.clone();
                inner.send_to(&peer, packet);
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Packet>, TransportError> {
        Ok(self.inbox.lock().await.recv().await)
    }

    async fn assume_host(&self) -> Result<(), TransportError> {
        let mut inner = self.mesh.lock().await;
        if !inner.peers.contains_key(&self.peer) {
            return Err(TransportError::NotAttached(self.peer.clone()));
        }
        inner.host = Some(self.peer.clone());
        tracing::info!(peer_id = %self.peer, "routing as host");
        Ok(())
    }
}
