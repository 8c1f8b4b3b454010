//! The error type surfaced at the facade boundary: every lower-layer
//! error (`ConsensusError`, `BlockError`, `SiloError`) converges here so
//! callers only ever match on one enum.

use shared_types::Address;
use thiserror::Error;

/// Errors a [`crate::Model`] operation can raise.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Fetch/remove found no peer holding the address.
    #[error("no block found at {0}")]
    MissingBlock(Address),

    /// Insert targeted an already-present immutable address.
    #[error("block already present at {0}")]
    Collision(Address),

    /// Paxos decided a value other than the caller's, and no resolver
    /// (or the resolver itself) accepted it.
    #[error("conflicting concurrent write at {0}")]
    Conflict(Address),

    /// A block's signature/address/version self-check failed.
    #[error("block at {0} failed validation")]
    ValidationFailed(Address),

    /// No reachable peer had room for the write.
    #[error("no peer had space for the write at {0}")]
    InsufficientSpace(Address),

    /// The local silo backing this model failed.
    #[error("local silo error: {0}")]
    Silo(#[from] silo::SiloError),

    /// The underlying consensus/network layer failed outright.
    #[error("consensus error: {0}")]
    Network(String),
}

impl From<consensus::ConsensusError> for ModelError {
    fn from(err: consensus::ConsensusError) -> Self {
        match err {
            consensus::ConsensusError::MissingBlock(addr) => ModelError::MissingBlock(addr),
            consensus::ConsensusError::Collision(addr) => ModelError::Collision(addr),
            consensus::ConsensusError::Conflict { address } => ModelError::Conflict(address),
            consensus::ConsensusError::ValidationFailed(addr) => ModelError::ValidationFailed(addr),
            consensus::ConsensusError::InsufficientSpace { address, .. } => {
                ModelError::InsufficientSpace(address)
            }
            consensus::ConsensusError::Unavailable(_) | consensus::ConsensusError::Network(_) => {
                ModelError::Network(err.to_string())
            }
        }
    }
}

impl From<block_model::BlockError> for ModelError {
    fn from(err: block_model::BlockError) -> Self {
        ModelError::Network(err.to_string())
    }
}

impl From<dock::DockError> for ModelError {
    fn from(err: dock::DockError) -> Self {
        ModelError::Network(err.to_string())
    }
}
