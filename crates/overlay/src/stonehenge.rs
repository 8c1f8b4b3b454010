//! Static-peer-list overlay: ownership is a deterministic function of
//! the address's first byte, modulo the peer count.

use parking_lot::RwLock;
use async_trait::async_trait;
use shared_types::{Address, NodeId};

use crate::errors::OverlayError;
use crate::location::PeerLocation;
use crate::traits::Overlay;

/// A fixed, totally-ordered list of known peers. `owner(addr) =
/// addr.bytes[0] mod peers.len()`; `lookup`/`allocate` walk `n` peers
/// cyclically starting from that owner, so a read and an allocate for
/// the same address agree on where the first replica lives.
pub struct Stonehenge {
    peers: RwLock<Vec<(NodeId, PeerLocation)>>,
}

impl Stonehenge {
    /// Build a Stonehenge overlay from an initial peer list. The list
    /// order is significant: it determines which peer "owns" which
    /// address, so it must be constructed identically (e.g. sorted by
    /// `NodeId`) by every process that is supposed to agree on
    /// ownership.
    pub fn new(peers: Vec<(NodeId, PeerLocation)>) -> Self {
        Self { peers: RwLock::new(peers) }
    }

    fn owner_index(&self, addr: &Address, count: usize) -> usize {
        let first_byte = addr.as_bytes()[0] as usize;
        first_byte % count
    }

    fn cyclic(&self, start: usize, n: usize) -> Result<Vec<NodeId>, OverlayError> {
        let peers = self.peers.read();
        if peers.is_empty() {
            return Err(OverlayError::InsufficientPeers { requested: n, known: 0 });
        }
        if n > peers.len() {
            return Err(OverlayError::InsufficientPeers { requested: n, known: peers.len() });
        }
        Ok((0..n).map(|i| peers[(start + i) % peers.len()].0).collect())
    }
}

#[async_trait]
impl Overlay for Stonehenge {
    async fn lookup(&self, addr: Address, n: usize, _fast: bool) -> Result<Vec<NodeId>, OverlayError> {
        let count = self.peers.read().len();
        if count == 0 {
            return Err(OverlayError::InsufficientPeers { requested: n, known: 0 });
        }
        let start = self.owner_index(&addr, count);
        self.cyclic(start, n)
    }

    async fn allocate(&self, addr: Address, n: usize) -> Result<Vec<NodeId>, OverlayError> {
        self.lookup(addr, n, false).await
    }

    async fn lookup_node(&self, node_id: NodeId) -> Result<PeerLocation, OverlayError> {
        self.peers
            .read()
            .iter()
            .find(|(id, _)| *id == node_id)
            .map(|(_, loc)| loc.clone())
            .ok_or(OverlayError::UnknownNode)
    }

    fn discover(&self, locations: Vec<(NodeId, PeerLocation)>) {
        let mut peers = self.peers.write();
        for (id, loc) in locations {
            if let Some(existing) = peers.iter_mut().find(|(existing_id, _)| *existing_id == id) {
                existing.1 = loc;
            } else {
                peers.push((id, loc));
            }
        }
    }

    fn discovered(&self, id: NodeId) -> bool {
        self.peers.read().iter().any(|(existing, _)| *existing == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(n: u8) -> Vec<(NodeId, PeerLocation)> {
        (0..n)
            .map(|i| (NodeId([i; 32]), PeerLocation::new("127.0.0.1", 4000 + i as u16)))
            .collect()
    }

    #[tokio::test]
    async fn owner_is_deterministic_for_the_same_address() {
        let overlay = Stonehenge::new(peers(4));
        let addr = Address::random(true);
        let first = overlay.lookup(addr, 1, false).await.unwrap();
        let second = overlay.lookup(addr, 1, false).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn lookup_wraps_cyclically_past_the_end_of_the_list() {
        let overlay = Stonehenge::new(peers(3));
        let mut addr_bytes = [0u8; 32];
        addr_bytes[0] = 2; // owner index 2 on a 3-peer ring
        let addr = Address::from_raw(addr_bytes);

        let owners = overlay.lookup(addr, 3, false).await.unwrap();
        assert_eq!(owners, vec![NodeId([2u8; 32]), NodeId([0u8; 32]), NodeId([1u8; 32])]);
    }

    #[tokio::test]
    async fn requesting_more_peers_than_known_is_an_error() {
        let overlay = Stonehenge::new(peers(2));
        assert!(matches!(
            overlay.lookup(Address::random(true), 5, false).await,
            Err(OverlayError::InsufficientPeers { requested: 5, known: 2 })
        ));
    }

    #[tokio::test]
    async fn discover_adds_new_peers_and_updates_known_ones() {
        let overlay = Stonehenge::new(peers(1));
        let new_id = NodeId([9u8; 32]);
        overlay.discover(vec![(new_id, PeerLocation::new("10.0.0.9", 4009))]);
        assert!(overlay.discovered(new_id));

        overlay.discover(vec![(new_id, PeerLocation::new("10.0.0.99", 5000))]);
        let loc = overlay.lookup_node(new_id).await.unwrap();
        assert_eq!(loc.port, 5000);
    }
}
