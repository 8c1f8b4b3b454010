//! Content-Hashed Block: immutable, addressed by `H(content ‖ salt ‖ owner)`.

use serde::{Deserialize, Serialize};
use shared_crypto::hashing::blake3_hash_many;
use shared_types::Address;

use crate::errors::BlockError;

/// An immutable, content-addressed block. Anyone may create one; its
/// address is a hash of its own content, so no signature is needed to
/// prove authorship — the content *is* the proof.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chb {
    address: Address,
    payload: Vec<u8>,
    salt: [u8; 32],
    owner_address: Address,
}

impl Chb {
    /// Build and seal a new CHB over `payload`, optionally pointing at
    /// `owner_address` (use [`Address::NULL`] when there is none).
    pub fn new(payload: Vec<u8>, owner_address: Address) -> Self {
        let mut salt = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut salt);
        Self::with_salt(payload, salt, owner_address)
    }

    /// Build a CHB with an explicit salt (used by tests needing a
    /// deterministic address, and by the wire codec on decode).
    pub fn with_salt(payload: Vec<u8>, salt: [u8; 32], owner_address: Address) -> Self {
        let digest = Self::compute_digest(&payload, &salt, &owner_address);
        Self {
            address: Address::new(digest, false),
            payload,
            salt,
            owner_address,
        }
    }

    fn compute_digest(payload: &[u8], salt: &[u8; 32], owner_address: &Address) -> [u8; 32] {
        blake3_hash_many(&[payload, salt, owner_address.as_bytes()])
    }

    /// This block's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The declared owner pointer (may be [`Address::NULL`]).
    pub fn owner_address(&self) -> Address {
        self.owner_address
    }

    /// `seal` is a no-op for CHBs: the address already fully determines
    /// validity, there is no version or signature to compute. Kept for
    /// symmetry with the mutable variants' `seal`.
    pub fn seal(&self) -> &Self {
        self
    }

    /// Recompute the address from content and compare against the
    /// stored one.
    pub fn validate(&self) -> Result<(), BlockError> {
        let digest = Self::compute_digest(&self.payload, &self.salt, &self.owner_address);
        let expected = Address::new(digest, false);
        if expected != self.address {
            return Err(BlockError::AddressMismatch {
                claimed: self.address,
                computed: expected,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chb_round_trip_hashes_and_validates() {
        let chb = Chb::new(b"hello".to_vec(), Address::NULL);
        assert!(chb.validate().is_ok());
        assert_eq!(chb.payload(), b"hello");
        assert!(chb.address().is_immutable());
    }

    #[test]
    fn tampered_payload_fails_validation() {
        let mut chb = Chb::new(b"hello".to_vec(), Address::NULL);
        chb.payload = b"goodbye".to_vec();
        assert!(matches!(
            chb.validate(),
            Err(BlockError::AddressMismatch { .. })
        ));
    }

    #[test]
    fn deterministic_address_with_fixed_salt() {
        let salt = [7u8; 32];
        let a = Chb::with_salt(b"hello".to_vec(), salt, Address::NULL);
        let b = Chb::with_salt(b"hello".to_vec(), salt, Address::NULL);
        assert_eq!(a.address(), b.address());
    }
}
