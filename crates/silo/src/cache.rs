//! In-memory LRU cache in front of any backend.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::Address;

use crate::errors::SiloError;
use crate::traits::{KeyStatus, Silo};

/// An LRU cache over any backend. When `use_list` is enabled, the full
/// key-set (not just the cached subset) is tracked in memory so
/// [`Silo::status`] never touches the backend.
pub struct Cache {
    inner: Arc<dyn Silo>,
    lru: Mutex<LruCache<Address, Vec<u8>>>,
    use_list: Option<Mutex<HashSet<Address>>>,
}

impl Cache {
    /// Wrap `inner` with an LRU of `capacity` entries.
    pub async fn new(inner: Arc<dyn Silo>, capacity: usize, use_list: bool) -> Result<Self, SiloError> {
        let use_list = if use_list {
            Some(Mutex::new(inner.list().await?.into_iter().collect()))
        } else {
            None
        };
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Ok(Self {
            inner,
            lru: Mutex::new(LruCache::new(capacity)),
            use_list,
        })
    }
}

#[async_trait]
impl Silo for Cache {
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError> {
        if let Some(hit) = self.lru.lock().get(&addr).cloned() {
            return Ok(hit);
        }
        let bytes = self.inner.get(addr).await?;
        self.lru.lock().put(addr, bytes.clone());
        Ok(bytes)
    }

    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError> {
        let delta = self.inner.set(addr, bytes.clone(), insert, update).await?;
        self.lru.lock().put(addr, bytes);
        if let Some(use_list) = &self.use_list {
            use_list.lock().insert(addr);
        }
        Ok(delta)
    }

    async fn erase(&self, addr: Address) -> Result<i64, SiloError> {
        let delta = self.inner.erase(addr).await?;
        self.lru.lock().pop(&addr);
        if let Some(use_list) = &self.use_list {
            use_list.lock().remove(&addr);
        }
        Ok(delta)
    }

    async fn list(&self) -> Result<Vec<Address>, SiloError> {
        self.inner.list().await
    }

    async fn status(&self, addr: Address) -> KeyStatus {
        if let Some(use_list) = &self.use_list {
            return if use_list.lock().contains(&addr) {
                KeyStatus::Exists
            } else {
                KeyStatus::Missing
            };
        }
        self.inner.status(addr).await
    }

    fn usage(&self) -> u64 {
        self.inner.usage()
    }

    fn block_count(&self) -> u64 {
        self.inner.block_count()
    }

    fn capacity(&self) -> Option<u64> {
        self.inner.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use shared_types::NodeId;

    #[tokio::test]
    async fn repeated_get_serves_from_the_cache() {
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let addr = Address::random(false);
        inner.set(addr, b"hello".to_vec(), true, true).await.unwrap();

        let cache = Cache::new(inner.clone(), 8, false).await.unwrap();
        assert_eq!(cache.get(addr).await.unwrap(), b"hello");
        inner.erase(addr).await.unwrap();
        // still served from the cache, no re-fetch from the now-empty backend
        assert_eq!(cache.get(addr).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn use_list_answers_status_without_touching_the_backend() {
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let addr = Address::random(false);
        let cache = Cache::new(inner.clone(), 8, true).await.unwrap();
        assert_eq!(cache.status(addr).await, KeyStatus::Missing);
        cache.set(addr, b"hello".to_vec(), true, true).await.unwrap();
        assert_eq!(cache.status(addr).await, KeyStatus::Exists);
    }

    #[tokio::test]
    async fn eviction_drops_the_least_recently_used_entry() {
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let cache = Cache::new(inner, 1, false).await.unwrap();
        let a = Address::random(false);
        let b = Address::random(true);
        cache.set(a, b"a".to_vec(), true, true).await.unwrap();
        cache.set(b, b"b".to_vec(), true, true).await.unwrap();
        assert_eq!(cache.lru.lock().len(), 1);
        assert!(cache.lru.lock().contains(&b));
    }
}
