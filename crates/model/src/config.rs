//! Plain construction data for a [`crate::Model`].
//!
//! `overlay_factory`/`consensus_factory` are closures rather than a
//! single concrete type because the whole point of the composable
//! `Silo`/`Overlay`/`Consensus` traits is that callers stack wrappers
//! (`Cache`, `Async`, `Strip`, `Mirror`, ...) however their deployment
//! needs; the factory gets the already-constructed overlay/dock handed
//! to it so it can close over them when building the consensus stack.
//! Parsing these values from a config file or argv is out of scope here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shared_crypto::signatures::Ed25519KeyPair;
use shared_types::{Address, NodeId, Passport, PublicKey};
use silo::Silo;

/// Which wire transport(s) a [`crate::Model`] listens on.
///
/// Only [`Protocol::Tcp`] has a transport implementation in this
/// workspace; `Utp`/`Both` are accepted here to keep the config shape
/// faithful to the source system but [`crate::Model::new`] rejects them
/// rather than silently falling back to TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Protocol {
    Tcp,
    Utp,
    Both,
}

/// Builds an [`overlay::Overlay`] for a new [`crate::Model`]. Takes no
/// arguments: an overlay's own bootstrap state (peer list, self
/// location) is closed over by the factory closure itself.
pub type OverlayFactory = Arc<dyn Fn() -> Arc<dyn overlay::Overlay> + Send + Sync>;

/// Builds a [`consensus::Consensus`] stack given the overlay and dock a
/// [`crate::Model`] has already constructed, so the closure can stack
/// `Cache`/`Async` wrappers over a [`consensus::DistributedConsensus`]
/// built from them.
pub type ConsensusFactory =
    Arc<dyn Fn(Arc<dyn overlay::Overlay>, Arc<dock::Dock>, Passport) -> Arc<dyn consensus::Consensus> + Send + Sync>;

/// Everything needed to construct a [`crate::Model`].
pub struct ModelConfig {
    /// This node's id in the overlay/dock layer.
    pub node_id: NodeId,
    /// Address this node's own identity block (an OKB) lives at.
    pub owner_id: Address,
    /// Signing key behind `owner_id` and this node's passport.
    pub owner_keys: Ed25519KeyPair,
    /// This node's capability passport.
    pub passport: Passport,
    /// Public key of the network owner that issued `passport`.
    pub network_owner: PublicKey,
    /// Builds the overlay this model resolves addresses through.
    pub overlay_factory: OverlayFactory,
    /// Builds the consensus stack this model drives.
    pub consensus_factory: ConsensusFactory,
    /// Address to accept inbound connections on; `None` means
    /// outbound-only (a pure client).
    pub listen_addr: Option<SocketAddr>,
    /// The local silo backing this node's own `ConsensusHandler`, when
    /// this node also serves as a storage replica. `None` for a
    /// client-only model that never answers storage RPCs.
    pub silo: Option<Arc<dyn Silo>>,
    /// Public keys allowed to administer this network (e.g. issue
    /// passports) regardless of what a GB's embedded ACL says.
    pub admin_keys: Vec<PublicKey>,
    /// Which wire transport(s) to listen on.
    pub protocol: Protocol,
    /// Interval between keepalive pings on idle TCP connections.
    pub tcp_heartbeat: Duration,
    /// Deadline for establishing a new outbound connection.
    pub connect_timeout: Duration,
    /// How long a peer may go unresponsive before the overlay marks it
    /// dead for quorum-rebalancing purposes.
    pub soft_fail_timeout: Duration,
    /// Whether to resign this node's memberships on a graceful shutdown
    /// rather than leaving peers to discover it is gone via timeout.
    pub resign_on_shutdown: bool,
}

impl ModelConfig {
    /// Defaults suitable for a single local node talking to itself,
    /// useful for tests: TCP, a 30s heartbeat, a 5s connect timeout, a
    /// 15s soft-fail timeout, no admins, resigning on shutdown.
    pub fn with_defaults(
        node_id: NodeId,
        owner_id: Address,
        owner_keys: Ed25519KeyPair,
        passport: Passport,
        network_owner: PublicKey,
        overlay_factory: OverlayFactory,
        consensus_factory: ConsensusFactory,
    ) -> Self {
        Self {
            node_id,
            owner_id,
            owner_keys,
            passport,
            network_owner,
            overlay_factory,
            consensus_factory,
            listen_addr: None,
            silo: None,
            admin_keys: Vec::new(),
            protocol: Protocol::Tcp,
            tcp_heartbeat: Duration::from_secs(30),
            connect_timeout: dock::DEFAULT_CONNECT_TIMEOUT,
            soft_fail_timeout: Duration::from_secs(15),
            resign_on_shutdown: true,
        }
    }
}
