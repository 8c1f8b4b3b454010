//! Consensus errors.

use shared_types::Address;
use thiserror::Error;

/// Errors raised by the consensus layer, sitting between the model
/// facade and the peer layer.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Fetch/remove found no peer holding `addr`.
    #[error("no peer holds a block at {0}")]
    MissingBlock(Address),

    /// Insert targeted an already-present immutable address.
    #[error("block already present at {0}")]
    Collision(Address),

    /// Paxos decided a value other than the caller's, and no
    /// `ConflictResolver` (or the resolver itself) accepted it.
    #[error("paxos at {address} decided a conflicting value")]
    Conflict {
        /// Address whose write lost the race.
        address: Address,
    },

    /// A peer's signature/address/version self-check failed.
    #[error("block at {0} failed validation")]
    ValidationFailed(Address),

    /// Every reachable peer refused the write for lack of room.
    #[error("no peer had space for {requested} bytes at {address}")]
    InsufficientSpace { address: Address, requested: u64 },

    /// Fewer than a majority of quorum members answered within the
    /// deadline.
    #[error("paxos at {0} could not reach a quorum")]
    Unavailable(Address),

    /// The overlay or dock layer failed outright (network error,
    /// unresolvable peer).
    #[error("consensus network error: {0}")]
    Network(String),
}

impl From<overlay::OverlayError> for ConsensusError {
    fn from(err: overlay::OverlayError) -> Self {
        ConsensusError::Network(err.to_string())
    }
}

impl From<dock::DockError> for ConsensusError {
    fn from(err: dock::DockError) -> Self {
        match err {
            dock::DockError::Network(_) | dock::DockError::Timeout | dock::DockError::Closed => {
                ConsensusError::Network(err.to_string())
            }
            other => ConsensusError::Network(other.to_string()),
        }
    }
}
