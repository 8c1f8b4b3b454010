//! The `Consensus` contract the model facade drives, and that every
//! stacked wrapper (`Cache`, `Async`) also implements so it can sit in
//! front of a backend consensus transparently.

use std::sync::Arc;

use async_trait::async_trait;
use block_model::{Block, RemoveSignature};
use shared_types::{Address, PublicKey};

use crate::errors::ConsensusError;
use crate::resolver::ConflictResolver;

#[async_trait]
pub trait Consensus: Send + Sync {
    /// Create a new address: an immutable block (CHB/NB/UB), or the
    /// first version of a mutable one (OKB/ACB/GB).
    async fn insert(&self, block: Block) -> Result<(), ConsensusError>;

    /// Read the current value at `address`. `MissingBlock` if nothing
    /// has ever reached a majority of owners.
    async fn fetch(&self, address: Address) -> Result<Block, ConsensusError>;

    /// Write a new version of a mutable block. `resolver` is consulted
    /// if a concurrent writer's version is chosen instead of `block`'s;
    /// without one, any such race surfaces as `Conflict`. Returns the
    /// block that ultimately got committed (`block` itself, or whatever
    /// the resolver produced).
    async fn update(&self, block: Block, resolver: Option<Arc<dyn ConflictResolver>>) -> Result<Block, ConsensusError>;

    /// Delete the block at `address`, authorized by `signature`.
    /// `signer_key` carries the public key that produced `signature`
    /// when it can't be recovered from the stored block itself — a CHB
    /// records its owner as an `Address` (a hash), not a raw key, so
    /// removing one requires the caller to supply the key out of band.
    /// Mutable blocks and NB/UB ignore it: their owning key is already
    /// part of the stored block.
    async fn remove(
        &self,
        address: Address,
        signature: RemoveSignature,
        signer_key: Option<PublicKey>,
    ) -> Result<(), ConsensusError>;
}
