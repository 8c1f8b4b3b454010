//! The per-process connection pool: owns the listening socket, the
//! `node_id -> Peer` cache, and this node's handshake identity.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shared_types::{NodeId, Passport};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use overlay::PeerLocation;

use crate::connection::Connection;
use crate::errors::DockError;
use crate::handler::RpcHandler;
use crate::handshake::HandshakeIdentity;
use crate::peer::Peer;

/// How long `make_peer` waits for a fresh TCP connect + handshake
/// before giving up.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The connection pool for one node. Holds a weak cache of every peer
/// it currently knows how to reach; the cache only keeps a connection
/// alive as long as some other part of the process (an overlay result,
/// a paxos client) also holds a strong reference to the same `Peer`.
pub struct Dock {
    pub node_id: NodeId,
    identity: Arc<HandshakeIdentity>,
    local_handler: Arc<dyn RpcHandler>,
    connect_timeout: Duration,
    peers: RwLock<HashMap<NodeId, std::sync::Weak<Connection>>>,
    listener_task: RwLock<Option<JoinHandle<()>>>,
}

impl Dock {
    pub fn new(identity: HandshakeIdentity, local_handler: Arc<dyn RpcHandler>) -> Self {
        Self {
            node_id: identity.node_id,
            identity: Arc::new(identity),
            local_handler,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            peers: RwLock::new(HashMap::new()),
            listener_task: RwLock::new(None),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bind a TCP listener on `addr` and spawn the accept loop. Every
    /// accepted socket runs the responder side of the handshake and,
    /// on success, is folded into the peer cache under the remote's
    /// node id.
    pub async fn listen(self: &Arc<Self>, addr: SocketAddr) -> Result<SocketAddr, DockError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let dock = Arc::clone(self);
        let handle = tokio::spawn(async move { dock.accept_loop(listener).await });
        *self.listener_task.write() = Some(handle);
        Ok(local_addr)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "dock accept loop failed, stopping");
                    return;
                }
            };
            let dock = Arc::clone(&self);
            tokio::spawn(async move {
                let location = PeerLocation { host: remote_addr.ip().to_string(), port: remote_addr.port() };
                match Connection::accept(stream, location, Arc::clone(&dock.identity), Arc::clone(&dock.local_handler)).await {
                    Ok(conn) => dock.insert(conn),
                    Err(err) => debug!(%remote_addr, %err, "inbound handshake failed"),
                }
            });
        }
    }

    fn insert(&self, conn: Arc<Connection>) {
        self.peers.write().insert(conn.remote_node_id, Arc::downgrade(&conn));
    }

    /// A `Peer` routing to this node itself, bypassing the wire.
    pub fn local_peer(&self) -> Peer {
        Peer::Local(Arc::clone(&self.local_handler))
    }

    /// Return the cached connection to `node_id`, or dial `location`
    /// fresh if the cache has nothing live. `expected` is the node id
    /// the caller believes lives at `location`, checked by the
    /// handshake itself.
    ///
    /// Returns a `Peer::Local` instead of dialing when `node_id` is
    /// this node's own id, since the overlay may legitimately return
    /// us as one of our own address's owners.
    pub async fn make_peer(self: &Arc<Self>, node_id: NodeId, location: PeerLocation) -> Result<Peer, DockError> {
        if node_id == self.node_id {
            return Ok(self.local_peer());
        }
        if let Some(conn) = self.cached(node_id) {
            return Ok(Peer::Remote(conn));
        }
        let conn = Connection::dial(
            location,
            Some(node_id),
            Arc::clone(&self.identity),
            Arc::clone(&self.local_handler),
            self.connect_timeout,
        )
        .await?;
        self.insert(Arc::clone(&conn));
        Ok(Peer::Remote(conn))
    }

    fn cached(&self, node_id: NodeId) -> Option<Arc<Connection>> {
        let peers = self.peers.read();
        peers.get(&node_id).and_then(|weak| weak.upgrade())
    }

    /// Every currently-live remote peer, for broadcast-style calls
    /// that don't go through the overlay (e.g. quorum reconfiguration
    /// notices).
    pub fn live_peers(&self) -> Vec<Peer> {
        self.peers
            .read()
            .values()
            .filter_map(|weak| weak.upgrade())
            .map(Peer::Remote)
            .collect()
    }

    pub fn passport(&self) -> &Passport {
        &self.identity.passport
    }
}

impl Drop for Dock {
    fn drop(&mut self) {
        if let Some(handle) = self.listener_task.write().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared_crypto::signatures::Ed25519KeyPair;
    use shared_types::Capabilities;

    struct Echo;

    #[async_trait]
    impl RpcHandler for Echo {
        async fn handle(&self, method: &str, _passport: &Passport, payload: &[u8]) -> Result<Vec<u8>, DockError> {
            if method == "echo" {
                Ok(payload.to_vec())
            } else {
                Err(DockError::UnknownRpc(method.to_string()))
            }
        }
    }

    fn identity(id: u8, network_owner: &Ed25519KeyPair) -> HandshakeIdentity {
        let keys = Ed25519KeyPair::from_seed([id; 32]);
        let mut passport = Passport {
            user_key: *keys.public_key().as_bytes(),
            network_name: "acme".into(),
            capabilities: Capabilities::OWNER,
            issuer_key: *network_owner.public_key().as_bytes(),
            signature: [0u8; 64],
        };
        passport.signature = *network_owner.sign(&passport.signing_bytes()).as_bytes();
        HandshakeIdentity { node_id: NodeId([id; 32]), identity: keys, passport, network_owner: *network_owner.public_key().as_bytes() }
    }

    #[tokio::test]
    async fn make_peer_returns_local_for_self() {
        let network_owner = Ed25519KeyPair::from_seed([9u8; 32]);
        let dock = Arc::new(Dock::new(identity(1, &network_owner), Arc::new(Echo)));
        let peer = dock
            .make_peer(NodeId([1u8; 32]), PeerLocation { host: "127.0.0.1".into(), port: 0 })
            .await
            .unwrap();
        assert!(peer.is_local());
    }

    #[tokio::test]
    async fn dials_and_caches_a_remote_peer() {
        let network_owner = Ed25519KeyPair::from_seed([9u8; 32]);
        let server_dock = Arc::new(Dock::new(identity(2, &network_owner), Arc::new(Echo)));
        let addr = server_dock.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let client_dock = Arc::new(Dock::new(identity(1, &network_owner), Arc::new(Echo)));
        let location = PeerLocation { host: addr.ip().to_string(), port: addr.port() };

        let peer = client_dock.make_peer(NodeId([2u8; 32]), location.clone()).await.unwrap();
        assert!(!peer.is_local());
        let reply = peer.call("echo", client_dock.passport().clone(), b"hi".to_vec(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply, b"hi");

        let cached = client_dock.make_peer(NodeId([2u8; 32]), location).await.unwrap();
        assert!(matches!((&peer, &cached), (Peer::Remote(a), Peer::Remote(b)) if Arc::ptr_eq(a, b)));
    }
}
