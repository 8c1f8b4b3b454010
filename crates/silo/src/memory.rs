//! In-process hash map backend, used for tests and as the `Cache`
//! wrapper's storage.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::EventBus;
use shared_types::{Address, NodeId};

use crate::errors::SiloError;
use crate::traits::{KeyStatus, Silo};
use crate::usage::UsageTracker;

/// An in-memory silo backend.
pub struct Memory {
    store: RwLock<HashMap<Address, Vec<u8>>>,
    usage: UsageTracker,
}

impl Memory {
    pub fn new(owner: NodeId) -> Self {
        Self::with_capacity(owner, None, None)
    }

    pub fn with_capacity(owner: NodeId, capacity: Option<u64>, bus: Option<EventBus>) -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
            usage: UsageTracker::new("memory", owner, capacity, bus),
        }
    }
}

#[async_trait]
impl Silo for Memory {
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError> {
        self.store
            .read()
            .get(&addr)
            .cloned()
            .ok_or(SiloError::MissingKey(addr))
    }

    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError> {
        if let Some(capacity) = self.usage.capacity() {
            let existing = self.store.read().get(&addr).map(Vec::len).unwrap_or(0) as u64;
            let projected = self.usage.usage() - existing + bytes.len() as u64;
            if projected > capacity {
                return Err(SiloError::InsufficientSpace {
                    requested: bytes.len() as u64,
                    available: capacity.saturating_sub(self.usage.usage()),
                });
            }
        }

        let mut store = self.store.write();
        let present = store.contains_key(&addr);
        if present && !update {
            return Err(SiloError::Collision(addr));
        }
        if !present && !insert {
            return Err(SiloError::MissingKey(addr));
        }

        let old_len = store.get(&addr).map(Vec::len);
        let new_len = bytes.len();
        store.insert(addr, bytes);
        drop(store);
        Ok(self.usage.record_set(old_len, new_len))
    }

    async fn erase(&self, addr: Address) -> Result<i64, SiloError> {
        let removed = self.store.write().remove(&addr);
        match removed {
            Some(bytes) => Ok(self.usage.record_erase(bytes.len())),
            None => Err(SiloError::MissingKey(addr)),
        }
    }

    async fn list(&self) -> Result<Vec<Address>, SiloError> {
        Ok(self.store.read().keys().copied().collect())
    }

    async fn status(&self, addr: Address) -> KeyStatus {
        if self.store.read().contains_key(&addr) {
            KeyStatus::Exists
        } else {
            KeyStatus::Missing
        }
    }

    fn usage(&self) -> u64 {
        self.usage.usage()
    }

    fn block_count(&self) -> u64 {
        self.usage.block_count()
    }

    fn capacity(&self) -> Option<u64> {
        self.usage.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> NodeId {
        NodeId([0u8; 32])
    }

    #[tokio::test]
    async fn get_after_set_returns_what_was_stored() {
        let silo = Memory::new(owner());
        let addr = Address::random(false);
        silo.set(addr, b"hello".to_vec(), true, true).await.unwrap();
        assert_eq!(silo.get(addr).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn strict_insert_collides_on_existing_key() {
        let silo = Memory::new(owner());
        let addr = Address::random(false);
        silo.set(addr, b"a".to_vec(), true, false).await.unwrap();
        assert!(matches!(
            silo.set(addr, b"b".to_vec(), true, false).await,
            Err(SiloError::Collision(_))
        ));
    }

    #[tokio::test]
    async fn strict_update_fails_on_missing_key() {
        let silo = Memory::new(owner());
        let addr = Address::random(false);
        assert!(matches!(
            silo.set(addr, b"a".to_vec(), false, true).await,
            Err(SiloError::MissingKey(_))
        ));
    }

    #[tokio::test]
    async fn erase_then_get_is_missing_key() {
        let silo = Memory::new(owner());
        let addr = Address::random(false);
        silo.set(addr, b"a".to_vec(), true, true).await.unwrap();
        silo.erase(addr).await.unwrap();
        assert!(matches!(silo.get(addr).await, Err(SiloError::MissingKey(_))));
    }

    #[tokio::test]
    async fn list_enumerates_exactly_the_stored_keys() {
        let silo = Memory::new(owner());
        let a = Address::random(false);
        let b = Address::random(true);
        silo.set(a, b"a".to_vec(), true, true).await.unwrap();
        silo.set(b, b"b".to_vec(), true, true).await.unwrap();
        let mut listed = silo.list().await.unwrap();
        listed.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn capacity_rejects_writes_that_would_overflow_it() {
        let silo = Memory::with_capacity(owner(), Some(4), None);
        let addr = Address::random(false);
        assert!(matches!(
            silo.set(addr, b"12345".to_vec(), true, true).await,
            Err(SiloError::InsufficientSpace { .. })
        ));
    }
}
