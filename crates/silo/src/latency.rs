//! Debug/fault-injection wrapper: adds an artificial delay (and,
//! optionally, a synthetic failure rate) in front of any backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_types::Address;

use crate::errors::SiloError;
use crate::traits::{KeyStatus, Silo};

/// Wraps a backend with a fixed delay before every operation, and an
/// optional "fail every Nth call" fault injector for exercising retry
/// paths in tests.
pub struct Latency {
    inner: Arc<dyn Silo>,
    delay: Duration,
    fail_every: Option<u64>,
    calls: AtomicU64,
}

impl Latency {
    pub fn new(inner: Arc<dyn Silo>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            fail_every: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Every `n`th call (1-indexed) fails with [`SiloError::Wrapper`]
    /// instead of reaching the backend.
    pub fn with_fault_injection(mut self, fail_every: u64) -> Self {
        self.fail_every = Some(fail_every.max(1));
        self
    }

    async fn before_call(&self) -> Result<(), SiloError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(n) = self.fail_every {
            let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if call % n == 0 {
                return Err(SiloError::Wrapper("injected fault".into()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Silo for Latency {
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError> {
        self.before_call().await?;
        self.inner.get(addr).await
    }

    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError> {
        self.before_call().await?;
        self.inner.set(addr, bytes, insert, update).await
    }

    async fn erase(&self, addr: Address) -> Result<i64, SiloError> {
        self.before_call().await?;
        self.inner.erase(addr).await
    }

    async fn list(&self) -> Result<Vec<Address>, SiloError> {
        self.before_call().await?;
        self.inner.list().await
    }

    async fn status(&self, addr: Address) -> KeyStatus {
        if self.before_call().await.is_err() {
            return KeyStatus::Unknown;
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
    use std::time::Instant;

    #[tokio::test]
    async fn delay_is_applied_before_delegating() {
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let latency = Latency::new(inner, Duration::from_millis(10));
        let start = Instant::now();
        let addr = Address::random(false);
        latency.set(addr, b"x".to_vec(), true, true).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn fault_injection_fails_every_nth_call() {
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let latency = Latency::new(inner, Duration::ZERO).with_fault_injection(2);
        let addr = Address::random(false);
        assert!(latency.set(addr, b"x".to_vec(), true, true).await.is_ok());
        assert!(latency.set(addr, b"y".to_vec(), true, true).await.is_err());
        assert!(latency.set(addr, b"z".to_vec(), true, true).await.is_ok());
    }
}
