//! The top-level [`Consensus`] implementation: dispatches immutable
//! blocks (CHB/NB/UB) to the replicate-to-majority protocol in
//! [`crate::immutable`] and mutable ones (OKB/ACB/GB) to the Multi-Paxos
//! protocol in [`crate::mutable`], keyed off [`Address::is_mutable`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use block_model::{Block, RemoveSignature};
use overlay::Overlay;
use shared_types::{Address, Passport, PublicKey};

use crate::errors::ConsensusError;
use crate::immutable;
use crate::mutable;
use crate::quorum::Quorum;
use crate::resolver::ConflictResolver;
use crate::traits::Consensus;

/// Default per-RPC timeout for every consensus call this layer issues.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives both protocols against a shared overlay and dock, under one
/// passport and one replication factor.
pub struct DistributedConsensus {
    overlay: Arc<dyn Overlay>,
    dock: Arc<dock::Dock>,
    passport: Passport,
    replication_factor: usize,
    call_timeout: Duration,
}

impl DistributedConsensus {
    pub fn new(
        overlay: Arc<dyn Overlay>,
        dock: Arc<dock::Dock>,
        passport: Passport,
        replication_factor: usize,
    ) -> Self {
        Self {
            overlay,
            dock,
            passport,
            replication_factor,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Current quorum membership for a mutable address, as seen through
    /// the overlay. Used by callers that need to drive a reconfiguration
    /// directly rather than through a write.
    pub async fn current_quorum(&self, address: Address) -> Result<Quorum, ConsensusError> {
        let members = self.overlay.lookup(address, self.replication_factor, false).await?;
        Ok(Quorum::new(members))
    }

    /// Replace `dead` with `replacement` in `address`'s quorum.
    pub async fn reconfigure(
        &self,
        address: Address,
        current: &Quorum,
        dead: shared_types::NodeId,
        replacement: shared_types::NodeId,
    ) -> Result<Quorum, ConsensusError> {
        mutable::reconfigure(
            &self.overlay,
            &self.dock,
            &self.passport,
            self.call_timeout,
            address,
            current,
            dead,
            replacement,
        )
        .await
    }
}

#[async_trait]
impl Consensus for DistributedConsensus {
    async fn insert(&self, block: Block) -> Result<(), ConsensusError> {
        block
            .validate()
            .map_err(|_| ConsensusError::ValidationFailed(block.address()))?;

        if block.is_mutable() {
            let address = block.address();
            let written = mutable::write(
                &self.overlay,
                &self.dock,
                &self.passport,
                self.replication_factor,
                self.call_timeout,
                block.clone(),
                None,
            )
            .await?;
            if written != block {
                return Err(ConsensusError::Collision(address));
            }
            Ok(())
        } else {
            immutable::insert(
                &self.overlay,
                &self.dock,
                &self.passport,
                self.replication_factor,
                self.call_timeout,
                block,
            )
            .await
        }
    }

    async fn fetch(&self, address: Address) -> Result<Block, ConsensusError> {
        if address.is_mutable() {
            mutable::read(
                &self.overlay,
                &self.dock,
                &self.passport,
                self.replication_factor,
                self.call_timeout,
                address,
                None,
            )
            .await?
            .ok_or(ConsensusError::MissingBlock(address))
        } else {
            immutable::fetch(
                &self.overlay,
                &self.dock,
                &self.passport,
                self.replication_factor,
                self.call_timeout,
                address,
            )
            .await
        }
    }

    async fn update(
        &self,
        block: Block,
        resolver: Option<Arc<dyn ConflictResolver>>,
    ) -> Result<Block, ConsensusError> {
        if !block.is_mutable() {
            return Err(ConsensusError::ValidationFailed(block.address()));
        }
        block
            .validate()
            .map_err(|_| ConsensusError::ValidationFailed(block.address()))?;
        mutable::write(
            &self.overlay,
            &self.dock,
            &self.passport,
            self.replication_factor,
            self.call_timeout,
            block,
            resolver,
        )
        .await
    }

    async fn remove(
        &self,
        address: Address,
        signature: RemoveSignature,
        signer_key: Option<PublicKey>,
    ) -> Result<(), ConsensusError> {
        immutable::remove(
            &self.overlay,
            &self.dock,
            &self.passport,
            self.replication_factor,
            self.call_timeout,
            address,
            signature,
            signer_key,
        )
        .await
    }
}
