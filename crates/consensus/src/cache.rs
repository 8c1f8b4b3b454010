//! LRU cache in front of any [`Consensus`] backend.
//!
//! Mirrors `silo::Cache`'s shape, generalized from raw bytes to
//! [`Block`]s: mutable entries carry a TTL (a stale cached version is
//! worse than a cache miss), immutable ones don't need one since their
//! content never changes. A local `insert`/`update`/`remove` always
//! invalidates or refreshes its own entry; this wrapper does not listen
//! for writes made by other nodes.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use block_model::{Block, RemoveSignature};
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{Address, PublicKey};
use silo::Silo;

use crate::errors::ConsensusError;
use crate::resolver::ConflictResolver;
use crate::traits::Consensus;

struct Entry {
    block: Block,
    cached_at: Instant,
}

/// An LRU over `Block`s, with an optional on-disk overflow silo keyed by
/// address for entries the in-memory ring has already evicted.
pub struct Cache {
    inner: Arc<dyn Consensus>,
    mutable_ttl: Option<Duration>,
    entries: Mutex<LruCache<Address, Entry>>,
    overflow: Option<Arc<dyn Silo>>,
}

impl Cache {
    pub fn new(inner: Arc<dyn Consensus>, capacity: usize, mutable_ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner,
            mutable_ttl,
            entries: Mutex::new(LruCache::new(capacity)),
            overflow: None,
        }
    }

    /// Back the cache with a disk overflow silo: entries the in-memory
    /// ring has evicted are still served from `overflow` before falling
    /// through to the backend consensus.
    pub fn with_overflow(mut self, overflow: Arc<dyn Silo>) -> Self {
        self.overflow = Some(overflow);
        self
    }

    fn insert_entry(&self, block: Block) {
        let address = block.address();
        self.entries.lock().put(address, Entry { block, cached_at: Instant::now() });
    }

    fn invalidate(&self, address: Address) {
        self.entries.lock().pop(&address);
    }

    /// A still-valid cached block for `address`, promoting it to
    /// most-recently-used. Stale mutable entries (past their TTL) are
    /// left in place but treated as a miss, matching a plain cache-miss
    /// fall-through to the backend.
    fn fresh_hit(&self, address: Address) -> Option<Block> {
        let mut entries = self.entries.lock();
        let stale = match entries.peek(&address) {
            Some(entry) => match self.mutable_ttl {
                Some(ttl) if entry.block.is_mutable() => entry.cached_at.elapsed() > ttl,
                _ => false,
            },
            None => return None,
        };
        if stale {
            return None;
        }
        entries.get(&address).map(|entry| entry.block.clone())
    }

    async fn overflow_hit(&self, address: Address) -> Option<Block> {
        let silo = self.overflow.as_ref()?;
        let bytes = silo.get(address).await.ok()?;
        block_model::wire::decode(&bytes).ok()
    }

    async fn write_overflow(&self, block: &Block) {
        if let Some(silo) = &self.overflow {
            if let Ok(bytes) = block_model::wire::encode(block) {
                let _ = silo::upsert(silo.as_ref(), block.address(), bytes).await;
            }
        }
    }

    async fn erase_overflow(&self, address: Address) {
        if let Some(silo) = &self.overflow {
            let _ = silo.erase(address).await;
        }
    }
}

#[async_trait]
impl Consensus for Cache {
    async fn insert(&self, block: Block) -> Result<(), ConsensusError> {
        self.inner.insert(block.clone()).await?;
        self.write_overflow(&block).await;
        self.insert_entry(block);
        Ok(())
    }

    async fn fetch(&self, address: Address) -> Result<Block, ConsensusError> {
        if let Some(block) = self.fresh_hit(address) {
            return Ok(block);
        }
        if let Some(block) = self.overflow_hit(address).await {
            self.insert_entry(block.clone());
            return Ok(block);
        }
        let block = self.inner.fetch(address).await?;
        self.write_overflow(&block).await;
        self.insert_entry(block.clone());
        Ok(block)
    }

    async fn update(
        &self,
        block: Block,
        resolver: Option<Arc<dyn ConflictResolver>>,
    ) -> Result<Block, ConsensusError> {
        let committed = self.inner.update(block, resolver).await?;
        self.write_overflow(&committed).await;
        self.insert_entry(committed.clone());
        Ok(committed)
    }

    async fn remove(
        &self,
        address: Address,
        signature: RemoveSignature,
        signer_key: Option<PublicKey>,
    ) -> Result<(), ConsensusError> {
        self.inner.remove(address, signature, signer_key).await?;
        self.invalidate(address);
        self.erase_overflow(address).await;
        Ok(())
    }
}
