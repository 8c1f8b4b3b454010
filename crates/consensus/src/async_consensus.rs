//! Journaling wrapper over any [`Consensus`] backend: acknowledges the
//! caller immediately, persists the op to disk, and replays it against
//! the backend in the background.
//!
//! Mirrors `silo::Async`'s journal (monotonic index, merge-to-net-effect,
//! `max_squash_size` forcing a synchronous flush) but over `Block`
//! operations rather than raw bytes. [`ConflictResolver`]s are not
//! serializable themselves, so a journaled `update` persists only the
//! resolver's [`ConflictResolver::name`]; replay looks the resolver back
//! up in a registry supplied at construction. An update journaled with a
//! resolver this node doesn't know by name (e.g. after a binary
//! downgrade) fails replay rather than silently dropping the resolver.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use block_model::{Block, RemoveSignature};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{Address, PublicKey};
use silo::JournalLock;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::errors::ConsensusError;
use crate::resolver::ConflictResolver;
use crate::traits::Consensus;

const ENTRIES_DIR: &str = "entries";
const LAST_INDEX_FILE: &str = "last_index";

#[derive(Debug, Clone, Serialize, Deserialize)]
enum JournalOp {
    Insert { block: Block },
    Update { block: Block, resolver_name: Option<String> },
    Remove { signature: RemoveSignature, signer_key: Option<PublicKey> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalEntry {
    address: Address,
    op: JournalOp,
}

struct Pending {
    index: u64,
    op: JournalOp,
}

/// Queues writes to disk and replays them against `inner` in the
/// background, squashing consecutive ops on the same address to their
/// net effect before a flush applies them.
pub struct Async {
    inner: Arc<dyn Consensus>,
    resolvers: HashMap<String, Arc<dyn ConflictResolver>>,
    journal_dir: PathBuf,
    _lock: JournalLock,
    next_index: AtomicU64,
    pending: Mutex<HashMap<Address, Pending>>,
    max_squash_size: Option<u64>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Async {
    pub async fn open(
        inner: Arc<dyn Consensus>,
        resolvers: HashMap<String, Arc<dyn ConflictResolver>>,
        journal_dir: impl Into<PathBuf>,
        max_squash_size: Option<u64>,
        flush_interval: Duration,
    ) -> Result<Arc<Self>, ConsensusError> {
        let journal_dir = journal_dir.into();
        fs::create_dir_all(journal_dir.join(ENTRIES_DIR))
            .await
            .map_err(|e| ConsensusError::Network(e.to_string()))?;
        let lock = JournalLock::acquire(&journal_dir).map_err(|e| ConsensusError::Network(e.to_string()))?;

        let this = Arc::new(Self {
            inner,
            resolvers,
            journal_dir,
            _lock: lock,
            next_index: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            max_squash_size,
            background: Mutex::new(None),
        });
        this.replay().await?;

        let owner = this.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            loop {
                ticker.tick().await;
                if let Err(err) = owner.flush().await {
                    warn!(%err, "async consensus background flush failed");
                }
            }
        });
        *this.background.lock() = Some(handle);

        Ok(this)
    }

    fn entries_dir(&self) -> PathBuf {
        self.journal_dir.join(ENTRIES_DIR)
    }

    fn resolver(&self, name: &Option<String>) -> Result<Option<Arc<dyn ConflictResolver>>, ConsensusError> {
        match name {
            None => Ok(None),
            Some(name) => self
                .resolvers
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| ConsensusError::Network(format!("unknown conflict resolver {name:?}"))),
        }
    }

    async fn replay(&self) -> Result<(), ConsensusError> {
        let last_index_path = self.journal_dir.join(LAST_INDEX_FILE);
        let last_applied: u64 = fs::read_to_string(&last_index_path)
            .await
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(self.entries_dir())
            .await
            .map_err(|e| ConsensusError::Network(e.to_string()))?;
        while let Some(file) = dir.next_entry().await.map_err(|e| ConsensusError::Network(e.to_string()))? {
            let name = file.file_name();
            let Some(index) = name.to_str().and_then(|s| s.parse::<u64>().ok()) else {
                continue;
            };
            if index <= last_applied {
                continue;
            }
            let bytes = fs::read(file.path()).await.map_err(|e| ConsensusError::Network(e.to_string()))?;
            let entry: JournalEntry = bincode::deserialize(&bytes)
                .map_err(|e| ConsensusError::Network(format!("corrupt journal entry: {e}")))?;
            entries.push((index, entry));
        }
        entries.sort_by_key(|(index, _)| *index);

        let mut merged: HashMap<Address, JournalOp> = HashMap::new();
        for (_, entry) in &entries {
            merged.insert(entry.address, entry.op.clone());
        }
        for (_, op) in merged {
            self.apply(op).await?;
        }

        let max_index = entries.iter().map(|(i, _)| *i).max();
        if let Some(max_index) = max_index {
            fs::write(&last_index_path, max_index.to_string())
                .await
                .map_err(|e| ConsensusError::Network(e.to_string()))?;
            for (index, _) in &entries {
                let _ = fs::remove_file(self.entries_dir().join(index.to_string())).await;
            }
            self.next_index.store(max_index + 1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn apply(&self, op: JournalOp) -> Result<(), ConsensusError> {
        match op {
            JournalOp::Insert { block } => {
                match self.inner.insert(block).await {
                    Ok(()) | Err(ConsensusError::Collision(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            JournalOp::Update { block, resolver_name } => {
                let resolver = self.resolver(&resolver_name)?;
                self.inner.update(block, resolver).await.map(|_| ())
            }
            JournalOp::Remove { signature, signer_key } => {
                match self.inner.remove(signature.address, signature, signer_key).await {
                    Ok(()) => Ok(()),
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn persist(&self, address: Address, op: &JournalOp) -> Result<u64, ConsensusError> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let entry = JournalEntry { address, op: op.clone() };
        let bytes = bincode::serialize(&entry).map_err(|e| ConsensusError::Network(e.to_string()))?;
        fs::write(self.entries_dir().join(index.to_string()), bytes)
            .await
            .map_err(|e| ConsensusError::Network(e.to_string()))?;
        Ok(index)
    }

    fn queue(&self, address: Address, index: u64, op: JournalOp) -> bool {
        let mut pending = self.pending.lock();
        pending.insert(address, Pending { index, op });
        self.max_squash_size.is_some_and(|max| pending.len() as u64 > max)
    }

    /// Apply every queued op against the backend now, clearing the
    /// journal on success.
    pub async fn flush(&self) -> Result<(), ConsensusError> {
        let drained: Vec<(Address, Pending)> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        if drained.is_empty() {
            return Ok(());
        }
        let max_index = drained.iter().map(|(_, p)| p.index).max();
        for (_, entry) in &drained {
            self.apply(entry.op.clone()).await?;
        }
        if let Some(max_index) = max_index {
            fs::write(self.journal_dir.join(LAST_INDEX_FILE), max_index.to_string())
                .await
                .map_err(|e| ConsensusError::Network(e.to_string()))?;
        }
        for (_, entry) in &drained {
            let _ = fs::remove_file(self.entries_dir().join(entry.index.to_string())).await;
        }
        Ok(())
    }
}

impl Drop for Async {
    fn drop(&mut self) {
        if let Some(handle) = self.background.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Consensus for Async {
    async fn insert(&self, block: Block) -> Result<(), ConsensusError> {
        let address = block.address();
        let op = JournalOp::Insert { block };
        let index = self.persist(address, &op).await?;
        if self.queue(address, index, op) {
            self.flush().await?;
        }
        Ok(())
    }

    async fn fetch(&self, address: Address) -> Result<Block, ConsensusError> {
        if let Some(pending) = self.pending.lock().get(&address) {
            match &pending.op {
                JournalOp::Insert { block } | JournalOp::Update { block, .. } => return Ok(block.clone()),
                JournalOp::Remove { .. } => return Err(ConsensusError::MissingBlock(address)),
            }
        }
        self.inner.fetch(address).await
    }

    async fn update(
        &self,
        block: Block,
        resolver: Option<Arc<dyn ConflictResolver>>,
    ) -> Result<Block, ConsensusError> {
        let address = block.address();
        let resolver_name = resolver.as_ref().map(|r| r.name().to_string());
        let op = JournalOp::Update { block: block.clone(), resolver_name };
        let index = self.persist(address, &op).await?;
        if self.queue(address, index, op) {
            self.flush().await?;
        }
        Ok(block)
    }

    async fn remove(
        &self,
        address: Address,
        signature: RemoveSignature,
        signer_key: Option<PublicKey>,
    ) -> Result<(), ConsensusError> {
        let op = JournalOp::Remove { signature, signer_key };
        let index = self.persist(address, &op).await?;
        if self.queue(address, index, op) {
            self.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_model::Chb;
    use shared_types::Address;
    use std::sync::Mutex as StdMutex;

    struct RecordingBackend {
        inserted: StdMutex<Vec<Block>>,
    }

    #[async_trait]
    impl Consensus for RecordingBackend {
        async fn insert(&self, block: Block) -> Result<(), ConsensusError> {
            self.inserted.lock().unwrap().push(block);
            Ok(())
        }
        async fn fetch(&self, address: Address) -> Result<Block, ConsensusError> {
            Err(ConsensusError::MissingBlock(address))
        }
        async fn update(&self, block: Block, _resolver: Option<Arc<dyn ConflictResolver>>) -> Result<Block, ConsensusError> {
            Ok(block)
        }
        async fn remove(&self, _address: Address, _signature: RemoveSignature, _signer_key: Option<PublicKey>) -> Result<(), ConsensusError> {
            Ok(())
        }
    }

    async fn open(inner: Arc<dyn Consensus>, dir: &std::path::Path) -> Arc<Async> {
        Async::open(inner, HashMap::new(), dir, None, Duration::from_secs(3600)).await.unwrap()
    }

    #[tokio::test]
    async fn insert_is_visible_immediately_before_flush() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordingBackend { inserted: StdMutex::new(Vec::new()) });
        let journal = open(backend.clone(), dir.path()).await;

        let chb = Block::Chb(Chb::new(b"hello".to_vec(), Address::NULL));
        journal.insert(chb.clone()).await.unwrap();

        assert_eq!(journal.fetch(chb.address()).await.unwrap(), chb);
        assert!(backend.inserted.lock().unwrap().is_empty());

        journal.flush().await.unwrap();
        assert_eq!(backend.inserted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exceeding_max_squash_size_flushes_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordingBackend { inserted: StdMutex::new(Vec::new()) });
        let journal = Async::open(backend.clone(), HashMap::new(), dir.path(), Some(1), Duration::from_secs(3600))
            .await
            .unwrap();

        journal.insert(Block::Chb(Chb::new(b"a".to_vec(), Address::NULL))).await.unwrap();
        journal.insert(Block::Chb(Chb::new(b"b".to_vec(), Address::NULL))).await.unwrap();

        assert_eq!(backend.inserted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reopening_replays_unflushed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let chb = Block::Chb(Chb::new(b"hello".to_vec(), Address::NULL));
        {
            let backend = Arc::new(RecordingBackend { inserted: StdMutex::new(Vec::new()) });
            let journal = open(backend, dir.path()).await;
            journal.insert(chb.clone()).await.unwrap();
        }
        let backend = Arc::new(RecordingBackend { inserted: StdMutex::new(Vec::new()) });
        let _journal = open(backend.clone(), dir.path()).await;
        assert_eq!(backend.inserted.lock().unwrap().len(), 1);
    }
}
