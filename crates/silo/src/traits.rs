//! The `Silo` contract every backend and composable wrapper implements.

use async_trait::async_trait;
use shared_types::Address;

use crate::errors::SiloError;

/// Advisory existence check. `Unknown` lets a wrapper (e.g. `Strip`
/// routing to an unreachable backend) answer without doing I/O or
/// lying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Exists,
    Missing,
    Unknown,
}

/// `Address -> bytes`. Every backend (`Memory`, `Filesystem`) and every
/// composable wrapper (`Cache`, `Crypt`, `Strip`, `Mirror`, `Async`,
/// `Latency`) implements this same trait, so they nest freely.
#[async_trait]
pub trait Silo: Send + Sync {
    /// Fetch the bytes stored at `addr`.
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError>;

    /// The atomic upsert primitive. `insert && update` is a plain
    /// upsert; `insert` alone means strict insert (errors
    /// [`SiloError::Collision`] if already present); `update` alone
    /// means strict update (errors [`SiloError::MissingKey`] if
    /// absent). Returns the signed byte delta (`new_size - old_size`).
    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError>;

    /// Remove the value at `addr`. Returns the (negative) byte delta.
    async fn erase(&self, addr: Address) -> Result<i64, SiloError>;

    /// Every address currently stored.
    async fn list(&self) -> Result<Vec<Address>, SiloError>;

    /// Advisory existence check, without necessarily doing I/O.
    async fn status(&self, addr: Address) -> KeyStatus;

    /// Bytes currently stored.
    fn usage(&self) -> u64;

    /// Keys currently stored.
    fn block_count(&self) -> u64;

    /// Configured capacity, if any.
    fn capacity(&self) -> Option<u64> {
        None
    }
}

/// `set`'s `insert`/`update` pair collapsed to a single upsert call,
/// used by call sites that don't care about strict-insert/strict-update
/// semantics.
pub async fn upsert(silo: &dyn Silo, addr: Address, bytes: Vec<u8>) -> Result<i64, SiloError> {
    silo.set(addr, bytes, true, true).await
}
