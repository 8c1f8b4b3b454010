//! A small real-TCP cluster of nodes, wired together the way a
//! deployment would: each node owns a [`Dock`] listening on
//! `127.0.0.1`, a [`Memory`] silo behind its [`ConsensusHandler`], and a
//! shared [`Stonehenge`] overlay naming every node's address.
//!
//! Unit tests in each crate cover a single node talking to itself
//! (`Peer::Local`) or two nodes over a loopback pair; this helper
//! exists so the scenarios in this crate can exercise a real
//! multi-peer Paxos quorum end to end.

use std::sync::Arc;

use consensus::{ConsensusHandler, DistributedConsensus};
use dock::{Dock, HandshakeIdentity};
use overlay::{PeerLocation, Stonehenge};
use shared_bus::EventBus;
use shared_crypto::signatures::Ed25519KeyPair;
use shared_types::{Capabilities, NodeId, Passport};
use silo::Memory;

/// One running node in a [`TestCluster`].
pub struct TestNode {
    pub node_id: NodeId,
    pub keys: Ed25519KeyPair,
    pub dock: Arc<Dock>,
    pub silo: Arc<Memory>,
}

impl TestNode {
    /// A [`DistributedConsensus`] client rooted at this node, resolving
    /// addresses through `overlay` with replication factor `factor`.
    pub fn consensus(&self, overlay: Arc<dyn overlay::Overlay>, factor: usize) -> DistributedConsensus {
        DistributedConsensus::new(overlay, Arc::clone(&self.dock), self.dock.passport().clone(), factor)
    }
}

/// `count` nodes, each listening on an OS-assigned loopback port, all
/// named in one shared [`Stonehenge`] overlay, all issued passports by
/// the same network owner.
pub struct TestCluster {
    pub network_owner: Ed25519KeyPair,
    pub nodes: Vec<TestNode>,
    pub overlay: Arc<dyn overlay::Overlay>,
}

fn signed_passport(network_owner: &Ed25519KeyPair, user: &Ed25519KeyPair) -> Passport {
    let mut passport = Passport {
        user_key: *user.public_key().as_bytes(),
        network_name: "integration-tests".into(),
        capabilities: Capabilities::OWNER,
        issuer_key: *network_owner.public_key().as_bytes(),
        signature: [0u8; 64],
    };
    passport.signature = *network_owner.sign(&passport.signing_bytes()).as_bytes();
    passport
}

impl TestCluster {
    pub async fn start(count: u8) -> Self {
        Self::start_with_silo_capacities(vec![None; count as usize]).await
    }

    /// Like [`TestCluster::start`], but each node's `Memory` silo is
    /// given the matching entry of `capacities` (`None` = unlimited).
    /// Lets a test make one specific replica refuse every write with
    /// `InsufficientSpace` instead of simply being unreachable, to
    /// exercise refusal handling distinct from a dead peer.
    pub async fn start_with_silo_capacities(capacities: Vec<Option<u64>>) -> Self {
        let network_owner = Ed25519KeyPair::from_seed([99u8; 32]);
        let mut nodes = Vec::with_capacity(capacities.len());
        let mut locations = Vec::with_capacity(capacities.len());

        for (i, capacity) in capacities.into_iter().enumerate() {
            let i = i as u8;
            let node_id = NodeId([i; 32]);
            let keys = Ed25519KeyPair::from_seed([i.wrapping_add(1); 32]);
            let passport = signed_passport(&network_owner, &keys);
            let silo = Arc::new(Memory::with_capacity(node_id, capacity, None));
            let handler = Arc::new(ConsensusHandler::new(silo.clone(), Arc::new(EventBus::new())));
            let identity = HandshakeIdentity {
                node_id,
                identity: keys.clone(),
                passport,
                network_owner: *network_owner.public_key().as_bytes(),
            };
            let dock = Arc::new(Dock::new(identity, handler));
            let addr = dock.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
            locations.push((node_id, PeerLocation::new("127.0.0.1", addr.port())));
            nodes.push(TestNode { node_id, keys, dock, silo });
        }

        let overlay: Arc<dyn overlay::Overlay> = Arc::new(Stonehenge::new(locations));
        Self { network_owner, nodes, overlay }
    }

    /// Stop accepting new connections on `index` and close its listening
    /// socket, simulating that peer going down. Any connection another
    /// node already holds to it is unaffected by this call; tests that
    /// want a clean "never reachable" peer should call this before any
    /// write touches it.
    pub fn kill(&mut self, index: usize) {
        // Dropping the last Arc<Dock> aborts its accept loop (see
        // `Dock`'s `Drop` impl), which drops the bound `TcpListener` and
        // frees the port; further dials to it fail immediately.
        let node = self.nodes.remove(index);
        drop(node);
    }

    pub fn passport_for(&self, index: usize) -> Passport {
        self.nodes[index].dock.passport().clone()
    }
}
