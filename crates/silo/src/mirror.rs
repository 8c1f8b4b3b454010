//! Full replication across N backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use shared_types::Address;

use crate::errors::SiloError;
use crate::traits::{KeyStatus, Silo};

/// Writes land on every backend; reads come from backend 0, or
/// round-robin across all of them when `balance_reads` is set.
pub struct Mirror {
    backends: Vec<Arc<dyn Silo>>,
    balance_reads: bool,
    next_read: AtomicUsize,
}

impl Mirror {
    pub fn new(backends: Vec<Arc<dyn Silo>>, balance_reads: bool) -> Self {
        assert!(!backends.is_empty(), "Mirror needs at least one backend");
        Self {
            backends,
            balance_reads,
            next_read: AtomicUsize::new(0),
        }
    }

    fn read_backend(&self) -> &Arc<dyn Silo> {
        if !self.balance_reads {
            return &self.backends[0];
        }
        let i = self.next_read.fetch_add(1, Ordering::Relaxed) % self.backends.len();
        &self.backends[i]
    }
}

#[async_trait]
impl Silo for Mirror {
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError> {
        self.read_backend().get(addr).await
    }

    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError> {
        let mut handles = Vec::with_capacity(self.backends.len());
        for backend in self.backends.iter().cloned() {
            let bytes = bytes.clone();
            handles.push(tokio::spawn(
                async move { backend.set(addr, bytes, insert, update).await },
            ));
        }
        let mut first_delta = None;
        for handle in handles {
            let delta = handle
                .await
                .map_err(|e| SiloError::Wrapper(format!("mirror write task panicked: {e}")))??;
            first_delta.get_or_insert(delta);
        }
        Ok(first_delta.unwrap_or(0))
    }

    async fn erase(&self, addr: Address) -> Result<i64, SiloError> {
        let mut handles = Vec::with_capacity(self.backends.len());
        for backend in self.backends.iter().cloned() {
            handles.push(tokio::spawn(async move { backend.erase(addr).await }));
        }
        let mut first_delta = None;
        for handle in handles {
            let delta = handle
                .await
                .map_err(|e| SiloError::Wrapper(format!("mirror erase task panicked: {e}")))??;
            first_delta.get_or_insert(delta);
        }
        Ok(first_delta.unwrap_or(0))
    }

    async fn list(&self) -> Result<Vec<Address>, SiloError> {
        self.backends[0].list().await
    }

    async fn status(&self, addr: Address) -> KeyStatus {
        self.backends[0].status(addr).await
    }

    fn usage(&self) -> u64 {
        self.backends[0].usage()
    }

    fn block_count(&self) -> u64 {
        self.backends[0].block_count()
    }

    fn capacity(&self) -> Option<u64> {
        self.backends[0].capacity()
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
    async fn a_write_lands_on_every_backend() {
        let backends = backends(3);
        let mirror = Mirror::new(backends.clone(), false);
        let addr = Address::random(false);
        mirror.set(addr, b"hello".to_vec(), true, true).await.unwrap();
        for backend in &backends {
            assert_eq!(backend.get(addr).await.unwrap(), b"hello");
        }
    }

    #[tokio::test]
    async fn balanced_reads_rotate_across_backends() {
        let raw = backends(3);
        let addr = Address::random(false);
        for backend in &raw {
            backend.set(addr, b"hello".to_vec(), true, true).await.unwrap();
        }
        let mirror = Mirror::new(raw, true);
        let first = mirror.next_read.load(Ordering::Relaxed);
        mirror.get(addr).await.unwrap();
        let second = mirror.next_read.load(Ordering::Relaxed);
        assert_ne!(first, second);
    }
}
