//! On-disk backend: one file per address, sharded by the address's
//! first two hex byte pairs (`root/aa/bb/<hex>.blk`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shared_bus::EventBus;
use shared_types::{Address, NodeId};
use tokio::fs;

use crate::errors::SiloError;
use crate::traits::{KeyStatus, Silo};
use crate::usage::UsageTracker;

const EXTENSION: &str = "blk";

/// A filesystem-backed silo rooted at a directory.
pub struct Filesystem {
    root: PathBuf,
    usage: UsageTracker,
}

impl Filesystem {
    pub async fn open(root: impl Into<PathBuf>, owner: NodeId) -> Result<Self, SiloError> {
        Self::open_with_capacity(root, owner, None, None).await
    }

    pub async fn open_with_capacity(
        root: impl Into<PathBuf>,
        owner: NodeId,
        capacity: Option<u64>,
        bus: Option<EventBus>,
    ) -> Result<Self, SiloError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(SiloError::backend)?;
        let fs = Self {
            root,
            usage: UsageTracker::new("filesystem", owner, capacity, bus),
        };
        fs.reindex().await?;
        Ok(fs)
    }

    fn shard_path(&self, addr: &Address) -> PathBuf {
        let hex = addr.to_hex();
        self.root
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{hex}.{EXTENSION}"))
    }

    async fn reindex(&self) -> Result<(), SiloError> {
        for addr in self.walk().await? {
            if let Ok(bytes) = fs::read(self.shard_path(&addr)).await {
                self.usage.record_set(None, bytes.len());
            }
        }
        Ok(())
    }

    async fn walk(&self) -> Result<Vec<Address>, SiloError> {
        let mut out = Vec::new();
        let mut top = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(_) => return Ok(out),
        };
        while let Some(first) = top.next_entry().await.map_err(SiloError::backend)? {
            if !first.file_type().await.map_err(SiloError::backend)?.is_dir() {
                continue;
            }
            let mut mid = fs::read_dir(first.path()).await.map_err(SiloError::backend)?;
            while let Some(second) = mid.next_entry().await.map_err(SiloError::backend)? {
                if !second.file_type().await.map_err(SiloError::backend)?.is_dir() {
                    continue;
                }
                let mut files = fs::read_dir(second.path()).await.map_err(SiloError::backend)?;
                while let Some(file) = files.next_entry().await.map_err(SiloError::backend)? {
                    let path = file.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        if let Ok(addr) = Address::from_hex(stem) {
                            out.push(addr);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    async fn read_len(path: &Path) -> Option<usize> {
        fs::read(path).await.ok().map(|b| b.len())
    }
}

#[async_trait]
impl Silo for Filesystem {
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError> {
        fs::read(self.shard_path(&addr))
            .await
            .map_err(|_| SiloError::MissingKey(addr))
    }

    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError> {
        let path = self.shard_path(&addr);
        let present = path.exists();
        if present && !update {
            return Err(SiloError::Collision(addr));
        }
        if !present && !insert {
            return Err(SiloError::MissingKey(addr));
        }
        if let Some(capacity) = self.usage.capacity() {
            let existing = if present {
                Self::read_len(&path).await.unwrap_or(0) as u64
            } else {
                0
            };
            let projected = self.usage.usage() - existing + bytes.len() as u64;
            if projected > capacity {
                return Err(SiloError::InsufficientSpace {
                    requested: bytes.len() as u64,
                    available: capacity.saturating_sub(self.usage.usage()),
                });
            }
        }

        let old_len = if present { Self::read_len(&path).await } else { None };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(SiloError::backend)?;
        }
        let new_len = bytes.len();
        fs::write(&path, bytes).await.map_err(SiloError::backend)?;
        Ok(self.usage.record_set(old_len, new_len))
    }

    async fn erase(&self, addr: Address) -> Result<i64, SiloError> {
        let path = self.shard_path(&addr);
        let len = Self::read_len(&path).await.ok_or(SiloError::MissingKey(addr))?;
        fs::remove_file(&path).await.map_err(SiloError::backend)?;
        Ok(self.usage.record_erase(len))
    }

    async fn list(&self) -> Result<Vec<Address>, SiloError> {
        self.walk().await
    }

    async fn status(&self, addr: Address) -> KeyStatus {
        if self.shard_path(&addr).exists() {
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
    async fn round_trips_through_the_sharded_path() {
        let dir = tempfile::tempdir().unwrap();
        let silo = Filesystem::open(dir.path(), owner()).await.unwrap();
        let addr = Address::random(false);
        silo.set(addr, b"hello".to_vec(), true, true).await.unwrap();
        assert_eq!(silo.get(addr).await.unwrap(), b"hello");
        assert!(silo.shard_path(&addr).starts_with(dir.path()));
    }

    #[tokio::test]
    async fn reopening_reindexes_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let addr = Address::random(false);
        {
            let silo = Filesystem::open(dir.path(), owner()).await.unwrap();
            silo.set(addr, b"hello".to_vec(), true, true).await.unwrap();
        }
        let reopened = Filesystem::open(dir.path(), owner()).await.unwrap();
        assert_eq!(reopened.usage(), 5);
        assert_eq!(reopened.block_count(), 1);
        assert_eq!(reopened.get(addr).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn erase_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let silo = Filesystem::open(dir.path(), owner()).await.unwrap();
        let addr = Address::random(false);
        silo.set(addr, b"hello".to_vec(), true, true).await.unwrap();
        silo.erase(addr).await.unwrap();
        assert!(matches!(silo.get(addr).await, Err(SiloError::MissingKey(_))));
    }
}
