//! Journaling wrapper: acknowledges the caller immediately, persists the
//! op, and applies it against the backend shortly after — either on the
//! next background flush tick or synchronously once `max_blocks`/
//! `max_size` is exceeded.
//!
//! The richer `(addr, kind, block_bytes?, remove_sig?, resolver?)`
//! journal entry shape belongs to the consensus layer's own `Async`
//! wrapper (stacked consensus, not stacked silo); this wrapper's entries
//! only ever carry a silo-level set/erase.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::Address;
use tokio::fs;
use tokio::task::JoinHandle;

use crate::errors::SiloError;
use crate::journal_lock::JournalLock;
use crate::traits::{KeyStatus, Silo};

const ENTRIES_DIR: &str = "entries";
const LAST_INDEX_FILE: &str = "last_index";

#[derive(Debug, Clone, Serialize, Deserialize)]
enum JournalOp {
    Set {
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    },
    Erase,
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

/// Journals writes to disk and applies them to `inner` in the
/// background. Merge rule: a second queued op against an address
/// replaces the first in the pending map — by the time a flush runs,
/// only the net effect per address is ever applied (`insert` then
/// `update` collapses to the latest bytes as an insert; any op
/// followed by `erase` collapses to `erase`).
pub struct Async {
    inner: Arc<dyn Silo>,
    journal_dir: PathBuf,
    _lock: JournalLock,
    next_index: AtomicU64,
    pending: Mutex<HashMap<Address, Pending>>,
    max_blocks: Option<u64>,
    max_size: Option<u64>,
    pending_usage_delta: AtomicI64,
    pending_count_delta: AtomicI64,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Async {
    /// Open (or recover) a journal directory over `inner`, replaying any
    /// entries left from a previous run, then start a background flusher
    /// ticking every `flush_interval`.
    pub async fn open(
        inner: Arc<dyn Silo>,
        journal_dir: impl Into<PathBuf>,
        max_blocks: Option<u64>,
        max_size: Option<u64>,
        flush_interval: Duration,
    ) -> Result<Arc<Self>, SiloError> {
        let journal_dir = journal_dir.into();
        fs::create_dir_all(journal_dir.join(ENTRIES_DIR))
            .await
            .map_err(SiloError::backend)?;
        let lock = JournalLock::acquire(&journal_dir)?;

        let this = Arc::new(Self {
            inner,
            journal_dir,
            _lock: lock,
            next_index: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            max_blocks,
            max_size,
            pending_usage_delta: AtomicI64::new(0),
            pending_count_delta: AtomicI64::new(0),
            background: Mutex::new(None),
        });
        this.replay().await?;

        let handle_owner = this.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            loop {
                ticker.tick().await;
                if let Err(err) = handle_owner.flush().await {
                    tracing::warn!(error = %err, "async silo background flush failed");
                }
            }
        });
        *this.background.lock() = Some(handle);

        Ok(this)
    }

    fn entries_dir(&self) -> PathBuf {
        self.journal_dir.join(ENTRIES_DIR)
    }

    async fn replay(&self) -> Result<(), SiloError> {
        let last_index_path = self.journal_dir.join(LAST_INDEX_FILE);
        let last_applied: u64 = fs::read_to_string(&last_index_path)
            .await
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(self.entries_dir()).await.map_err(SiloError::backend)?;
        while let Some(file) = dir.next_entry().await.map_err(SiloError::backend)? {
            let name = file.file_name();
            let Some(index) = name.to_str().and_then(|s| s.parse::<u64>().ok()) else {
                continue;
            };
            if index <= last_applied {
                continue;
            }
            let bytes = fs::read(file.path()).await.map_err(SiloError::backend)?;
            let entry: JournalEntry = bincode::deserialize(&bytes)
                .map_err(|e| SiloError::Wrapper(format!("corrupt journal entry: {e}")))?;
            entries.push((index, entry));
        }
        entries.sort_by_key(|(index, _)| *index);

        // Merge to net effect per address before replaying against the backend.
        let mut merged: HashMap<Address, JournalOp> = HashMap::new();
        for (_, entry) in &entries {
            merged.insert(entry.address, entry.op.clone());
        }
        for (address, op) in merged {
            self.apply(address, op).await?;
        }

        let max_index = entries.iter().map(|(i, _)| *i).max();
        if let Some(max_index) = max_index {
            fs::write(&last_index_path, max_index.to_string())
                .await
                .map_err(SiloError::backend)?;
            for (index, entry) in &entries {
                let _ = fs::remove_file(self.entries_dir().join(index.to_string())).await;
                let _ = entry;
            }
            self.next_index.store(max_index + 1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn apply(&self, address: Address, op: JournalOp) -> Result<(), SiloError> {
        match op {
            JournalOp::Set { bytes, insert, update } => {
                self.inner.set(address, bytes, insert, update).await?;
            }
            JournalOp::Erase => {
                match self.inner.erase(address).await {
                    Ok(_) | Err(SiloError::MissingKey(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    async fn persist(&self, address: Address, op: &JournalOp) -> Result<u64, SiloError> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let entry = JournalEntry { address, op: op.clone() };
        let bytes = bincode::serialize(&entry)
            .map_err(|e| SiloError::Wrapper(format!("journal encode failed: {e}")))?;
        fs::write(self.entries_dir().join(index.to_string()), bytes)
            .await
            .map_err(SiloError::backend)?;
        Ok(index)
    }

    /// Apply every currently queued op to the backend now, and clear the
    /// journal. Matches the `flush` operation referenced by testable
    /// property 7.
    pub async fn flush(&self) -> Result<(), SiloError> {
        let drained: Vec<(Address, Pending)> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        if drained.is_empty() {
            return Ok(());
        }
        let max_index = drained.iter().map(|(_, p)| p.index).max();
        for (address, entry) in &drained {
            self.apply(address.to_owned(), entry.op.clone()).await?;
        }
        if let Some(max_index) = max_index {
            let last_index_path = self.journal_dir.join(LAST_INDEX_FILE);
            fs::write(&last_index_path, max_index.to_string())
                .await
                .map_err(SiloError::backend)?;
        }
        for (_, entry) in &drained {
            let _ = fs::remove_file(self.entries_dir().join(entry.index.to_string())).await;
        }
        self.pending_usage_delta.store(0, Ordering::Relaxed);
        self.pending_count_delta.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn queued_bytes(&self, pending: &HashMap<Address, Pending>) -> u64 {
        pending
            .values()
            .map(|p| match &p.op {
                JournalOp::Set { bytes, .. } => bytes.len() as u64,
                JournalOp::Erase => 0,
            })
            .sum()
    }

    async fn effective_get(&self, addr: Address) -> Result<Option<Vec<u8>>, SiloError> {
        if let Some(entry) = self.pending.lock().get(&addr) {
            return Ok(match &entry.op {
                JournalOp::Set { bytes, .. } => Some(bytes.clone()),
                JournalOp::Erase => None,
            });
        }
        match self.inner.get(addr).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(SiloError::MissingKey(_)) => Ok(None),
            Err(e) => Err(e),
        }
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
impl Silo for Async {
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError> {
        self.effective_get(addr).await?.ok_or(SiloError::MissingKey(addr))
    }

    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError> {
        let present = self.effective_get(addr).await?.is_some();
        if present && !update {
            return Err(SiloError::Collision(addr));
        }
        if !present && !insert {
            return Err(SiloError::MissingKey(addr));
        }

        let old_len = self.effective_get(addr).await?.map(|b| b.len());
        let new_len = bytes.len();
        let op = JournalOp::Set { bytes, insert, update };
        let index = self.persist(addr, &op).await?;

        let delta = match old_len {
            Some(old) => new_len as i64 - old as i64,
            None => new_len as i64,
        };
        let is_new = old_len.is_none();

        {
            let mut pending = self.pending.lock();
            pending.insert(addr, Pending { index, op });
        }
        self.pending_usage_delta.fetch_add(delta, Ordering::Relaxed);
        if is_new {
            self.pending_count_delta.fetch_add(1, Ordering::Relaxed);
        }

        let should_flush_now = {
            let pending = self.pending.lock();
            self.max_blocks.is_some_and(|max| pending.len() as u64 > max)
                || self.max_size.is_some_and(|max| self.queued_bytes(&pending) > max)
        };
        if should_flush_now {
            self.flush().await?;
        }

        Ok(delta)
    }

    async fn erase(&self, addr: Address) -> Result<i64, SiloError> {
        let old = self.effective_get(addr).await?.ok_or(SiloError::MissingKey(addr))?;
        let old_len = old.len();
        let index = self.persist(addr, &JournalOp::Erase).await?;

        {
            let mut pending = self.pending.lock();
            pending.insert(addr, Pending { index, op: JournalOp::Erase });
        }
        self.pending_usage_delta.fetch_sub(old_len as i64, Ordering::Relaxed);
        self.pending_count_delta.fetch_sub(1, Ordering::Relaxed);

        Ok(-(old_len as i64))
    }

    async fn list(&self) -> Result<Vec<Address>, SiloError> {
        let mut addrs: std::collections::HashSet<Address> = self.inner.list().await?.into_iter().collect();
        let pending = self.pending.lock().clone_keys_and_ops();
        for (addr, op) in pending {
            match op {
                JournalOp::Set { .. } => {
                    addrs.insert(addr);
                }
                JournalOp::Erase => {
                    addrs.remove(&addr);
                }
            }
        }
        Ok(addrs.into_iter().collect())
    }

    async fn status(&self, addr: Address) -> KeyStatus {
        if let Some(entry) = self.pending.lock().get(&addr) {
            return match &entry.op {
                JournalOp::Set { .. } => KeyStatus::Exists,
                JournalOp::Erase => KeyStatus::Missing,
            };
        }
        self.inner.status(addr).await
    }

    fn usage(&self) -> u64 {
        let base = self.inner.usage() as i64;
        (base + self.pending_usage_delta.load(Ordering::Relaxed)).max(0) as u64
    }

    fn block_count(&self) -> u64 {
        let base = self.inner.block_count() as i64;
        (base + self.pending_count_delta.load(Ordering::Relaxed)).max(0) as u64
    }

    fn capacity(&self) -> Option<u64> {
        self.inner.capacity()
    }
}

trait CloneKeysAndOps {
    fn clone_keys_and_ops(&self) -> Vec<(Address, JournalOp)>;
}

impl CloneKeysAndOps for HashMap<Address, Pending> {
    fn clone_keys_and_ops(&self) -> Vec<(Address, JournalOp)> {
        self.iter().map(|(a, p)| (*a, p.op.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use shared_types::NodeId;

    async fn open_async(inner: Arc<dyn Silo>, dir: &Path) -> Arc<Async> {
        Async::open(inner, dir, None, None, Duration::from_secs(3600))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn set_is_visible_immediately_even_before_flush() {
        let dir = tempfile::tempdir().unwrap();
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let journal = open_async(inner.clone(), dir.path()).await;
        let addr = Address::random(false);
        journal.set(addr, b"hello".to_vec(), true, true).await.unwrap();

        assert_eq!(journal.get(addr).await.unwrap(), b"hello");
        assert!(inner.get(addr).await.is_err());

        journal.flush().await.unwrap();
        assert_eq!(inner.get(addr).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn merge_collapses_update_then_remove_to_a_net_remove() {
        let dir = tempfile::tempdir().unwrap();
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let journal = open_async(inner.clone(), dir.path()).await;
        let addr = Address::random(false);

        journal.set(addr, b"v1".to_vec(), true, true).await.unwrap();
        journal.set(addr, b"v2".to_vec(), true, true).await.unwrap();
        journal.erase(addr).await.unwrap();

        journal.flush().await.unwrap();
        assert!(inner.get(addr).await.is_err());
    }

    #[tokio::test]
    async fn exceeding_max_blocks_flushes_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let journal = Async::open(inner.clone(), dir.path(), Some(1), None, Duration::from_secs(3600))
            .await
            .unwrap();

        journal.set(Address::random(false), b"a".to_vec(), true, true).await.unwrap();
        journal.set(Address::random(false), b"b".to_vec(), true, true).await.unwrap();

        assert_eq!(inner.block_count(), 2);
    }

    #[tokio::test]
    async fn reopening_replays_unflushed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let addr = Address::random(false);
        {
            let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
            let journal = open_async(inner, dir.path()).await;
            journal.set(addr, b"hello".to_vec(), true, true).await.unwrap();
            // dropped without an explicit flush
        }
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let _journal = open_async(inner.clone(), dir.path()).await;
        assert_eq!(inner.get(addr).await.unwrap(), b"hello");
    }
}
