//! Owner Key Block: mutable, addressed by `H(block_pubkey)`.

use serde::{Deserialize, Serialize};
use shared_crypto::hashing::blake3_hash;
use shared_crypto::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::{Address, PublicKey};

use crate::errors::BlockError;

/// A mutable block writable only by the holder of the private key whose
/// hash is the block's address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Okb {
    address: Address,
    owner_key: PublicKey,
    version: u64,
    payload: Vec<u8>,
    signature: [u8; 64],
}

impl Okb {
    /// Derive the address an OKB for `owner_key` would have.
    pub fn address_for(owner_key: &PublicKey) -> Address {
        Address::new(blake3_hash(owner_key), true)
    }

    /// The bytes signed over: `(version ‖ payload)`.
    fn signing_bytes(version: u64, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(&version.to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    /// Create and seal version `version` of this block, signed by
    /// `owner`.
    pub fn seal(owner: &Ed25519KeyPair, version: u64, payload: Vec<u8>) -> Self {
        let owner_key = *owner.public_key().as_bytes();
        let signature = owner.sign(&Self::signing_bytes(version, &payload));
        Okb {
            address: Self::address_for(&owner_key),
            owner_key,
            version,
            payload,
            signature: *signature.as_bytes(),
        }
    }

    /// This block's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The version carried by this write.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The owner's public key (equivalently, `H(owner_key) == address`).
    pub fn owner_key(&self) -> &PublicKey {
        &self.owner_key
    }

    /// Validate self-consistency: address derivation and signature.
    /// `previous` is the highest version previously accepted for this
    /// address, if any, used to enforce the monotonic-version invariant.
    pub fn validate(&self, previous: Option<&Okb>) -> Result<(), BlockError> {
        let expected = Self::address_for(&self.owner_key);
        if expected != self.address {
            return Err(BlockError::AddressMismatch {
                claimed: self.address,
                computed: expected,
            });
        }

        let key = Ed25519PublicKey::from_bytes(self.owner_key)
            .map_err(|_| BlockError::SignatureInvalid)?;
        let signature = Ed25519Signature::from_bytes(self.signature);
        key.verify(&Self::signing_bytes(self.version, &self.payload), &signature)
            .map_err(|_| BlockError::SignatureInvalid)?;

        if let Some(previous) = previous {
            if self.version <= previous.version {
                return Err(BlockError::VersionNotMonotonic {
                    new: self.version,
                    current: previous.version,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn okb_seals_and_validates() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let v1 = Okb::seal(&owner, 1, b"v1".to_vec());
        assert!(v1.validate(None).is_ok());
        assert!(v1.address().is_mutable());
    }

    #[test]
    fn non_monotonic_version_is_rejected() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let v1 = Okb::seal(&owner, 1, b"v1".to_vec());
        let v1_again = Okb::seal(&owner, 1, b"v1b".to_vec());
        assert!(matches!(
            v1_again.validate(Some(&v1)),
            Err(BlockError::VersionNotMonotonic { .. })
        ));
    }

    #[test]
    fn forged_signature_fails() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let impostor = Ed25519KeyPair::from_seed([2u8; 32]);
        let mut block = Okb::seal(&owner, 1, b"v1".to_vec());
        let forged = impostor.sign(b"anything");
        block.signature = *forged.as_bytes();
        assert!(matches!(
            block.validate(None),
            Err(BlockError::SignatureInvalid)
        ));
    }
}
