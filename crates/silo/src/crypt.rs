//! Symmetric payload encryption in front of any backend.

use std::sync::Arc;

use async_trait::async_trait;
use shared_crypto::hashing::blake3_derive_key;
use shared_crypto::symmetric::{decrypt, encrypt, Nonce, SecretKey};
use shared_types::Address;

use crate::errors::SiloError;
use crate::traits::{KeyStatus, Silo};

/// Wraps a backend so every stored payload is XChaCha20-Poly1305
/// encrypted. Stored bytes are `nonce (24 bytes) ‖ ciphertext`, so
/// `usage`/`block_count` on the backend reflect ciphertext size.
pub struct Crypt {
    inner: Arc<dyn Silo>,
    key: SecretKey,
    /// When set, the key actually used per address is
    /// `derive(key, addr)` rather than `key` directly — so compromising
    /// one address's key doesn't expose every other address.
    salted: bool,
}

impl Crypt {
    pub fn new(inner: Arc<dyn Silo>, key: SecretKey, salted: bool) -> Self {
        Self { inner, key, salted }
    }

    fn key_for(&self, addr: &Address) -> SecretKey {
        if self.salted {
            SecretKey::from_bytes(blake3_derive_key("memoria silo crypt", &{
                let mut material = self.key.as_bytes().to_vec();
                material.extend_from_slice(addr.as_bytes());
                material
            }))
        } else {
            self.key.clone()
        }
    }
}

#[async_trait]
impl Silo for Crypt {
    async fn get(&self, addr: Address) -> Result<Vec<u8>, SiloError> {
        let stored = self.inner.get(addr).await?;
        if stored.len() < 24 {
            return Err(SiloError::Wrapper("encrypted payload too short".into()));
        }
        let (nonce_bytes, ciphertext) = stored.split_at(24);
        let mut nonce_arr = [0u8; 24];
        nonce_arr.copy_from_slice(nonce_bytes);
        let nonce = Nonce::from_bytes(nonce_arr);
        decrypt(&self.key_for(&addr), ciphertext, &nonce)
            .map_err(|e| SiloError::Wrapper(format!("decryption failed: {e}")))
    }

    async fn set(
        &self,
        addr: Address,
        bytes: Vec<u8>,
        insert: bool,
        update: bool,
    ) -> Result<i64, SiloError> {
        let (ciphertext, nonce) = encrypt(&self.key_for(&addr), &bytes)
            .map_err(|e| SiloError::Wrapper(format!("encryption failed: {e}")))?;
        let mut stored = nonce.as_bytes().to_vec();
        stored.extend_from_slice(&ciphertext);
        self.inner.set(addr, stored, insert, update).await
    }

    async fn erase(&self, addr: Address) -> Result<i64, SiloError> {
        self.inner.erase(addr).await
    }

    async fn list(&self) -> Result<Vec<Address>, SiloError> {
        self.inner.list().await
    }

    async fn status(&self, addr: Address) -> KeyStatus {
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
    async fn payload_round_trips_and_is_unreadable_on_the_backend() {
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let crypt = Crypt::new(inner.clone(), SecretKey::generate(), false);
        let addr = Address::random(false);
        crypt.set(addr, b"secret".to_vec(), true, true).await.unwrap();

        assert_eq!(crypt.get(addr).await.unwrap(), b"secret");
        let raw = inner.get(addr).await.unwrap();
        assert_ne!(raw, b"secret");
    }

    #[tokio::test]
    async fn salted_keys_differ_per_address() {
        let inner: Arc<dyn Silo> = Arc::new(Memory::new(NodeId([0u8; 32])));
        let master = SecretKey::generate();
        let crypt = Crypt::new(inner, master, true);
        let a = Address::random(false);
        let b = Address::random(true);
        assert_ne!(crypt.key_for(&a).as_bytes(), crypt.key_for(&b).as_bytes());
    }
}
