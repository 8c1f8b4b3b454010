//! Deterministic sharding across N backends.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::Address;

use crate::errors::SiloError;
use crate::traits::{KeyStatus, Silo};

/// Routes each address to `backends[sum(addr.bytes) % backends.len()]`.
/// The backend list order must stay stable across restarts for the
/// routing to stay deterministic.
pub struct Strip {
    backends: Vec<Arc<dyn Silo>>,
}

impl Strip {
    pub fn new(backends: Vec<Arc<dyn Silo>>) -> Self {
        assert!(!backends.is_empty(), "Strip needs at least one backend");
        Self { backends }
    }

    /// Which backend index `addr` routes to.
    pub fn route(&self, addr: &Address) -> usize {
        let sum: u64 = addr.as_bytes().iter().map(|b| *b as u64).sum();
        (sum % self.backends.len() as u64) as usize
    }

    fn backend_for(&self, addr: &Address) -> &Arc<dyn Silo> {
        &self.backends[self.route(addr)]
    }
}

#[async_trait]
impl Silo for Strip {
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError> {
        self.backend_for(&addr).get(addr).await
    }

    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError> {
        self.backend_for(&addr).set(addr, bytes, insert, update).await
    }

    async fn erase(&self, addr: Address) -> Result<i64, SiloError> {
        self.backend_for(&addr).erase(addr).await
    }

    async fn list(&self) -> Result<Vec<Address>, SiloError> {
        let mut out = Vec::new();
        for backend in &self.backends {
            out.extend(backend.list().await?);
        }
        Ok(out)
    }

    async fn status(&self, addr: Address) -> KeyStatus {
        self.backend_for(&addr).status(addr).await
    }

    fn usage(&self) -> u64 {
        self.backends.iter().map(|b| b.usage()).sum()
    }

    fn block_count(&self) -> u64 {
        self.backends.iter().map(|b| b.block_count()).sum()
    }

    fn capacity(&self) -> Option<u64> {
        self.backends.iter().map(|b| b.capacity()).sum::<Option<u64>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use shared_types::NodeId;

    fn backends(n: usize) -> Vec<Arc<dyn Silo>> {
        (0..n)
            .map(|i| Arc::new(Memory::new(NodeId([i as u8; 32]))) as Arc<dyn Silo>)
            .collect()
    }

    #[tokio::test]
    async fn routing_is_deterministic_for_a_fixed_backend_list() {
        let strip = Strip::new(backends(4));
        let addr = Address::random(false);
        let first = strip.route(&addr);
        let second = strip.route(&addr);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_the_routed_backend() {
        let strip = Strip::new(backends(4));
        let addr = Address::random(false);
        strip.set(addr, b"hello".to_vec(), true, true).await.unwrap();
        assert_eq!(strip.get(addr).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn list_aggregates_every_backend() {
        let strip = Strip::new(backends(2));
        let mut addrs = Vec::new();
        for _ in 0..10 {
            let addr = Address::random(false);
            strip.set(addr, b"x".to_vec(), true, true).await.unwrap();
            addrs.push(addr);
        }
        let mut listed = strip.list().await.unwrap();
        listed.sort();
        addrs.sort();
        assert_eq!(listed, addrs);
    }
}
