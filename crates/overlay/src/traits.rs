//! The `Overlay` contract every address-resolution backend implements.

use async_trait::async_trait;
use shared_types::{Address, NodeId};

use crate::errors::OverlayError;
use crate::location::PeerLocation;

/// Resolves addresses to the peers that own (or should own) them, and
/// tracks the set of peers the overlay currently knows about.
///
/// Reads use [`Overlay::lookup`]; the consensus/model layer opens an
/// actual connection to each returned [`NodeId`] through the dock, using
/// [`Overlay::lookup_node`] to find that id's [`PeerLocation`].
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Up to `n` peers that may already hold `addr`, for a read. `fast`
    /// requests a cheaper (possibly staler) answer when the backend can
    /// offer one, e.g. skipping a liveness re-check.
    async fn lookup(&self, addr: Address, n: usize, fast: bool) -> Result<Vec<NodeId>, OverlayError>;

    /// Exactly `n` peers to place a new replica set on, for an insert or
    /// a quorum (re)configuration.
    async fn allocate(&self, addr: Address, n: usize) -> Result<Vec<NodeId>, OverlayError>;

    /// The location of a specific, already-known node, for directed RPCs
    /// (e.g. a Paxos message addressed to one quorum member).
    async fn lookup_node(&self, node_id: NodeId) -> Result<PeerLocation, OverlayError>;

    /// Seed the overlay with additional known peers.
    fn discover(&self, locations: Vec<(NodeId, PeerLocation)>);

    /// Whether `id` is currently known to this overlay.
    fn discovered(&self, id: NodeId) -> bool;
}

/// `⌊n/2⌋ + 1`: the smallest strict majority of `n` peers — e.g. 2 of 3,
/// so a quorum of 3 keeps deciding with any 2 members reachable. Used by
/// the consensus layer's quorum math; kept here since it is defined in
/// terms of a peer count the overlay hands out.
pub fn majority(n: usize) -> usize {
    n / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_of_odd_and_even_counts() {
        assert_eq!(majority(1), 1);
        assert_eq!(majority(3), 2);
        assert_eq!(majority(4), 3);
        assert_eq!(majority(5), 3);
    }
}
