//! Single-node overlay: "I am the only peer."

use async_trait::async_trait;
use shared_types::{Address, NodeId};

use crate::errors::OverlayError;
use crate::location::PeerLocation;
use crate::traits::Overlay;

/// An overlay over a single, local node. Every lookup and allocation
/// yields that one node; asking for any `n != 1` is a programmer error
/// at the call site, surfaced as [`OverlayError::SingleNodeOverlay`].
pub struct Kalimero {
    self_id: NodeId,
    self_location: PeerLocation,
}

impl Kalimero {
    /// Build a Kalimero overlay identifying the local node as `self_id`,
    /// reachable at `self_location`.
    pub fn new(self_id: NodeId, self_location: PeerLocation) -> Self {
        Self { self_id, self_location }
    }

    /// The one node this overlay ever reports.
    pub fn self_id(&self) -> NodeId {
        self.self_id
    }
}

#[async_trait]
impl Overlay for Kalimero {
    async fn lookup(&self, _addr: Address, n: usize, _fast: bool) -> Result<Vec<NodeId>, OverlayError> {
        if n != 1 {
            return Err(OverlayError::SingleNodeOverlay { requested: n });
        }
        Ok(vec![self.self_id])
    }

    async fn allocate(&self, addr: Address, n: usize) -> Result<Vec<NodeId>, OverlayError> {
        self.lookup(addr, n, false).await
    }

    async fn lookup_node(&self, node_id: NodeId) -> Result<PeerLocation, OverlayError> {
        if node_id == self.self_id {
            Ok(self.self_location.clone())
        } else {
            Err(OverlayError::UnknownNode)
        }
    }

    fn discover(&self, _locations: Vec<(NodeId, PeerLocation)>) {
        // A single-node overlay has nothing else to learn about.
    }

    fn discovered(&self, id: NodeId) -> bool {
        id == self.self_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay() -> Kalimero {
        Kalimero::new(NodeId([1u8; 32]), PeerLocation::new("127.0.0.1", 4009))
    }

    #[tokio::test]
    async fn lookup_with_n_one_returns_self() {
        let overlay = overlay();
        let peers = overlay.lookup(Address::random(true), 1, false).await.unwrap();
        assert_eq!(peers, vec![overlay.self_id()]);
    }

    #[tokio::test]
    async fn lookup_with_other_n_is_an_error() {
        let overlay = overlay();
        assert!(matches!(
            overlay.lookup(Address::random(true), 3, false).await,
            Err(OverlayError::SingleNodeOverlay { requested: 3 })
        ));
    }

    #[tokio::test]
    async fn lookup_node_rejects_unknown_ids() {
        let overlay = overlay();
        assert!(matches!(
            overlay.lookup_node(NodeId([9u8; 32])).await,
            Err(OverlayError::UnknownNode)
        ));
    }
}
