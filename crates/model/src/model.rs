//! The top-level client facade.
//!
//! A `Model` owns one node's identity and wires together the overlay,
//! dock, and consensus layers a [`crate::config::ModelConfig`]
//! describes. Callers only ever see `fetch`/`insert`/`update`/`remove`
//! and a [`shared_bus::EventBus`] to subscribe to.

use std::sync::Arc;
use std::time::Duration;

use block_model::{Block, RemoveSignature};
use consensus::{Consensus, ConflictResolver, ConsensusHandler};
use dock::{Dock, HandshakeIdentity};
use overlay::Overlay;
use shared_bus::{EventBus, EventSubscription, LifecycleEvent};
use shared_types::{Address, Passport, PublicKey};
use silo::Silo;
use telemetry::MODEL_OPERATIONS;
use tracing::{info, instrument};

use crate::config::{ModelConfig, Protocol};
use crate::errors::ModelError;

/// A configured node: identity, consensus stack, and event bus.
pub struct Model {
    consensus: Arc<dyn Consensus>,
    bus: Arc<EventBus>,
    dock: Arc<Dock>,
    admin_keys: Vec<PublicKey>,
    resign_on_shutdown: bool,
}

impl Model {
    /// Build the dock, optionally bind its listener, build the overlay
    /// and consensus stack the config describes, and return a ready
    /// `Model`.
    #[instrument(skip(config), fields(node_id = ?config.node_id))]
    pub async fn new(config: ModelConfig) -> Result<Arc<Self>, ModelError> {
        if matches!(config.protocol, Protocol::Utp | Protocol::Both) {
            return Err(ModelError::Network(
                "utp transport is not implemented in this workspace".into(),
            ));
        }

        let bus = Arc::new(EventBus::new());
        let silo: Arc<dyn Silo> = config.silo.clone().unwrap_or_else(|| Arc::new(silo::Memory::new(config.node_id)));
        let handler = Arc::new(ConsensusHandler::new(silo, bus.clone()));

        let identity = HandshakeIdentity {
            node_id: config.node_id,
            identity: config.owner_keys,
            passport: config.passport.clone(),
            network_owner: config.network_owner,
        };
        let dock = Arc::new(Dock::new(identity, handler).with_connect_timeout(config.connect_timeout));

        if let Some(addr) = config.listen_addr {
            dock.listen(addr).await?;
        }

        let overlay: Arc<dyn Overlay> = (config.overlay_factory)();
        let consensus = (config.consensus_factory)(overlay, dock.clone(), config.passport.clone());

        info!("model ready");

        Ok(Arc::new(Self {
            consensus,
            bus,
            dock,
            admin_keys: config.admin_keys,
            resign_on_shutdown: config.resign_on_shutdown,
        }))
    }

    /// Subscribe to this model's lifecycle events.
    pub fn subscribe(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    /// Public keys allowed to administer this network regardless of a
    /// block's own embedded ACL.
    pub fn admin_keys(&self) -> &[PublicKey] {
        &self.admin_keys
    }

    pub fn dock(&self) -> &Arc<Dock> {
        &self.dock
    }

    /// Create a new address.
    #[instrument(skip(self, block), fields(address = %block.address()))]
    pub async fn insert(&self, block: Block) -> Result<(), ModelError> {
        let address = block.address();
        let version = block.version();
        let result = self.consensus.insert(block).await;
        self.record("insert", &result);
        result?;
        self.bus.publish(LifecycleEvent::Stored { address, version });
        Ok(())
    }

    /// Read the current value at `address`.
    #[instrument(skip(self))]
    pub async fn fetch(&self, address: Address) -> Result<Block, ModelError> {
        let result = self.consensus.fetch(address).await;
        self.record("fetch", &result);
        let block = result?;
        self.bus.publish(LifecycleEvent::Fetched { address });
        Ok(block)
    }

    /// Write a new version of a mutable block, resolving a concurrent
    /// write with `resolver` if one is in flight.
    #[instrument(skip(self, block, resolver), fields(address = %block.address()))]
    pub async fn update(
        &self,
        block: Block,
        resolver: Option<Arc<dyn ConflictResolver>>,
    ) -> Result<Block, ModelError> {
        let address = block.address();
        let result = self.consensus.update(block, resolver).await;
        self.record("update", &result);
        let committed = result?;
        self.bus.publish(LifecycleEvent::Stored { address, version: committed.version() });
        Ok(committed)
    }

    /// Delete the block at `address`.
    #[instrument(skip(self, signature))]
    pub async fn remove(
        &self,
        address: Address,
        signature: RemoveSignature,
        signer_key: Option<PublicKey>,
    ) -> Result<(), ModelError> {
        let result = self.consensus.remove(address, signature, signer_key).await;
        self.record("remove", &result);
        result?;
        self.bus.publish(LifecycleEvent::Removed { address });
        Ok(())
    }

    fn record<T>(&self, op: &str, result: &Result<T, consensus::ConsensusError>) {
        let outcome = if result.is_ok() { "ok" } else { "error" };
        MODEL_OPERATIONS.with_label_values(&[op, outcome]).inc();
    }

    /// Step down gracefully. With `resign_on_shutdown` this leaves a
    /// brief window for in-flight Paxos rounds against this node's own
    /// quorum memberships to finish before the dock's connections are
    /// torn down; a true handover (proactively replacing this node in
    /// every quorum it belongs to) would need a registry of which
    /// addresses it replicates, which this facade does not keep.
    pub async fn shutdown(&self) {
        if self.resign_on_shutdown {
            tokio::time::sleep(Duration::from_millis(50)).await;
            info!("resigning on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_model::Chb;
    use consensus::DistributedConsensus;
    use overlay::{Kalimero, PeerLocation};
    use shared_crypto::signatures::Ed25519KeyPair;
    use shared_types::{Capabilities, NodeId};

    fn passport(network_owner: &Ed25519KeyPair, user: &Ed25519KeyPair) -> Passport {
        let mut passport = Passport {
            user_key: *user.public_key().as_bytes(),
            network_name: "acme".into(),
            capabilities: Capabilities::OWNER,
            issuer_key: *network_owner.public_key().as_bytes(),
            signature: [0u8; 64],
        };
        passport.signature = *network_owner.sign(&passport.signing_bytes()).as_bytes();
        passport
    }

    async fn single_node_model() -> Arc<Model> {
        let network_owner = Ed25519KeyPair::from_seed([9u8; 32]);
        let node_keys = Ed25519KeyPair::from_seed([1u8; 32]);
        let node_id = NodeId([1u8; 32]);
        let passport = passport(&network_owner, &node_keys);

        let overlay_factory: crate::config::OverlayFactory = Arc::new(move || {
            Arc::new(Kalimero::new(node_id, PeerLocation { host: "127.0.0.1".into(), port: 0 })) as Arc<dyn Overlay>
        });
        let consensus_factory: crate::config::ConsensusFactory =
            Arc::new(|overlay, dock, passport| Arc::new(DistributedConsensus::new(overlay, dock, passport, 1)) as Arc<dyn Consensus>);

        let config = ModelConfig::with_defaults(
            node_id,
            Address::random(false),
            node_keys,
            passport,
            *network_owner.public_key().as_bytes(),
            overlay_factory,
            consensus_factory,
        );
        Model::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_fetch_round_trips_a_block() {
        let model = single_node_model().await;
        let mut sub = model.subscribe();

        let chb = Block::Chb(Chb::new(b"hello".to_vec(), Address::NULL));
        model.insert(chb.clone()).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.address(), Some(chb.address()));

        let fetched = model.fetch(chb.address()).await.unwrap();
        assert_eq!(fetched, chb);
    }

    #[tokio::test]
    async fn fetching_an_unknown_address_is_missing_block() {
        let model = single_node_model().await;
        let err = model.fetch(Address::random(false)).await.unwrap_err();
        assert!(matches!(err, ModelError::MissingBlock(_)));
    }

    #[tokio::test]
    async fn utp_protocol_is_rejected_at_construction() {
        let network_owner = Ed25519KeyPair::from_seed([9u8; 32]);
        let node_keys = Ed25519KeyPair::from_seed([1u8; 32]);
        let node_id = NodeId([1u8; 32]);
        let passport = passport(&network_owner, &node_keys);

        let overlay_factory: crate::config::OverlayFactory = Arc::new(move || {
            Arc::new(Kalimero::new(node_id, PeerLocation { host: "127.0.0.1".into(), port: 0 })) as Arc<dyn Overlay>
        });
        let consensus_factory: crate::config::ConsensusFactory =
            Arc::new(|overlay, dock, passport| Arc::new(DistributedConsensus::new(overlay, dock, passport, 1)) as Arc<dyn Consensus>);

        let mut config = ModelConfig::with_defaults(
            node_id,
            Address::random(false),
            node_keys,
            passport,
            *network_owner.public_key().as_bytes(),
            overlay_factory,
            consensus_factory,
        );
        config.protocol = Protocol::Utp;

        let err = Model::new(config).await.unwrap_err();
        assert!(matches!(err, ModelError::Network(_)));
    }
}
