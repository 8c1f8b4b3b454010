//! Composite overlay: serve several logical networks from one process
//! by delegating to the first backend overlay that has an answer.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{Address, NodeId};

use crate::errors::OverlayError;
use crate::location::PeerLocation;
use crate::traits::Overlay;

/// Composes several [`Overlay`] backends behind one handle. Every
/// operation delegates to the first backend in the list; additional
/// backends exist so one process can host more than one logical
/// network's overlay without the caller juggling handles itself.
pub struct Koordinate {
    backends: Vec<Arc<dyn Overlay>>,
}

impl Koordinate {
    /// Compose `backends` in priority order; `backends[0]` is consulted
    /// first (and, for `discover`, is the only one that actually learns
    /// the new peers).
    pub fn new(backends: Vec<Arc<dyn Overlay>>) -> Self {
        Self { backends }
    }

    fn primary(&self) -> Result<&Arc<dyn Overlay>, OverlayError> {
        self.backends.first().ok_or(OverlayError::NoBackend)
    }
}

#[async_trait]
impl Overlay for Koordinate {
    async fn lookup(&self, addr: Address, n: usize, fast: bool) -> Result<Vec<NodeId>, OverlayError> {
        self.primary()?.lookup(addr, n, fast).await
    }

    async fn allocate(&self, addr: Address, n: usize) -> Result<Vec<NodeId>, OverlayError> {
        self.primary()?.allocate(addr, n).await
    }

    async fn lookup_node(&self, node_id: NodeId) -> Result<PeerLocation, OverlayError> {
        for backend in &self.backends {
            if let Ok(location) = backend.lookup_node(node_id).await {
                return Ok(location);
            }
        }
        Err(OverlayError::UnknownNode)
    }

    fn discover(&self, locations: Vec<(NodeId, PeerLocation)>) {
        if let Some(primary) = self.backends.first() {
            primary.discover(locations);
        }
    }

    fn discovered(&self, id: NodeId) -> bool {
        self.backends.iter().any(|backend| backend.discovered(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kalimero::Kalimero;
    use crate::stonehenge::Stonehenge;

    #[tokio::test]
    async fn delegates_lookup_to_the_first_backend() {
        let primary = Arc::new(Kalimero::new(NodeId([1u8; 32]), PeerLocation::new("a", 1)));
        let secondary = Arc::new(Stonehenge::new(vec![(NodeId([2u8; 32]), PeerLocation::new("b", 2))]));
        let koordinate = Koordinate::new(vec![primary.clone(), secondary]);

        let peers = koordinate.lookup(Address::random(true), 1, false).await.unwrap();
        assert_eq!(peers, vec![NodeId([1u8; 32])]);
    }

    #[tokio::test]
    async fn lookup_node_falls_through_to_a_later_backend() {
        let primary = Arc::new(Kalimero::new(NodeId([1u8; 32]), PeerLocation::new("a", 1)));
        let secondary = Arc::new(Stonehenge::new(vec![(NodeId([2u8; 32]), PeerLocation::new("b", 2))]));
        let koordinate = Koordinate::new(vec![primary, secondary]);

        let location = koordinate.lookup_node(NodeId([2u8; 32])).await.unwrap();
        assert_eq!(location, PeerLocation::new("b", 2));
    }

    #[tokio::test]
    async fn empty_composite_reports_no_backend() {
        let koordinate = Koordinate::new(vec![]);
        assert!(matches!(
            koordinate.lookup(Address::random(true), 1, false).await,
            Err(OverlayError::NoBackend)
        ));
    }
}
