//! Named Block: immutable, addressed by `H(owner_pubkey ‖ name)`.
//!
//! Binds a human-chosen name to an owner's pointer (typically that
//! owner's OKB/ACB address). Written once; a later write to the same
//! name would collide at the silo layer rather than rebind it.

use serde::{Deserialize, Serialize};
use shared_crypto::hashing::blake3_hash_many;
use shared_crypto::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::{Address, PublicKey};

use crate::errors::BlockError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Nb {
    address: Address,
    owner_key: PublicKey,
    name: String,
    target: Address,
    signature: [u8; 64],
}

impl Nb {
    /// Derive the address an NB for `(owner_key, name)` would have.
    pub fn address_for(owner_key: &PublicKey, name: &str) -> Address {
        let digest = blake3_hash_many(&[owner_key, name.as_bytes()]);
        Address::new(digest, false)
    }

    fn signing_bytes(name: &str, target: &Address) -> Vec<u8> {
        let mut buf = Vec::with_capacity(name.len() + 32);
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(target.as_bytes());
        buf
    }

    /// Bind `name` to `target` under `owner`'s key.
    pub fn seal(owner: &Ed25519KeyPair, name: String, target: Address) -> Self {
        let owner_key = *owner.public_key().as_bytes();
        let signature = owner.sign(&Self::signing_bytes(&name, &target));
        Nb {
            address: Self::address_for(&owner_key, &name),
            owner_key,
            name,
            target,
            signature: *signature.as_bytes(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn owner_key(&self) -> &PublicKey {
        &self.owner_key
    }

    /// Validate address derivation and the owner's signature. NBs carry
    /// no version; there is nothing to check against a `previous` since
    /// a name is never rebound.
    pub fn validate(&self) -> Result<(), BlockError> {
        let expected = Self::address_for(&self.owner_key, &self.name);
        if expected != self.address {
            return Err(BlockError::AddressMismatch {
                claimed: self.address,
                computed: expected,
            });
        }

        let key = Ed25519PublicKey::from_bytes(self.owner_key)
            .map_err(|_| BlockError::SignatureInvalid)?;
        let signature = Ed25519Signature::from_bytes(self.signature);
        key.verify(&Self::signing_bytes(&self.name, &self.target), &signature)
            .map_err(|_| BlockError::SignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nb_binds_a_name_to_a_target() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let target = Address::random(true);
        let nb = Nb::seal(&owner, "alice".to_string(), target);
        assert!(nb.validate().is_ok());
        assert_eq!(nb.name(), "alice");
        assert_eq!(nb.target(), target);
    }

    #[test]
    fn same_owner_different_names_collide_never() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let a = Nb::seal(&owner, "alice".to_string(), Address::random(true));
        let b = Nb::seal(&owner, "bob".to_string(), Address::random(true));
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn tampered_target_fails_validation() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let mut nb = Nb::seal(&owner, "alice".to_string(), Address::random(true));
        nb.target = Address::random(true);
        assert!(matches!(nb.validate(), Err(BlockError::SignatureInvalid)));
    }
}
