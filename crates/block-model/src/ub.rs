//! User Block: immutable, forms the user directory.
//!
//! Two flavors addressed differently but sharing a shape: **forward**
//! (`H(username)`, username → pubkey) and **reverse** (`H(pubkey)`,
//! pubkey → username). A user typically publishes both so the registry
//! can be walked in either direction.

use serde::{Deserialize, Serialize};
use shared_crypto::hashing::blake3_hash;
use shared_crypto::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::{Address, PublicKey};

use crate::errors::BlockError;

/// Which value the address is derived from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    /// `address = H(username)`.
    Forward,
    /// `address = H(pubkey)`.
    Reverse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ub {
    address: Address,
    direction: Direction,
    username: String,
    owner_key: PublicKey,
    signature: [u8; 64],
}

impl Ub {
    /// Derive the address a forward UB for `username` would have.
    pub fn forward_address(username: &str) -> Address {
        Address::new(blake3_hash(username.as_bytes()), false)
    }

    /// Derive the address a reverse UB for `owner_key` would have.
    pub fn reverse_address(owner_key: &PublicKey) -> Address {
        Address::new(blake3_hash(owner_key), false)
    }

    fn address_for(direction: Direction, username: &str, owner_key: &PublicKey) -> Address {
        match direction {
            Direction::Forward => Self::forward_address(username),
            Direction::Reverse => Self::reverse_address(owner_key),
        }
    }

    fn signing_bytes(direction: Direction, username: &str, owner_key: &PublicKey) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + username.len() + 32);
        buf.push(match direction {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        });
        buf.extend_from_slice(username.as_bytes());
        buf.extend_from_slice(owner_key);
        buf
    }

    /// Seal a UB for `owner` binding `username`, in the requested
    /// direction.
    pub fn seal(owner: &Ed25519KeyPair, direction: Direction, username: String) -> Self {
        let owner_key = *owner.public_key().as_bytes();
        let signature = owner.sign(&Self::signing_bytes(direction, &username, &owner_key));
        Ub {
            address: Self::address_for(direction, &username, &owner_key),
            direction,
            username,
            owner_key,
            signature: *signature.as_bytes(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn owner_key(&self) -> &PublicKey {
        &self.owner_key
    }

    /// Validate address derivation and the owner's signature.
    pub fn validate(&self) -> Result<(), BlockError> {
        let expected = Self::address_for(self.direction, &self.username, &self.owner_key);
        if expected != self.address {
            return Err(BlockError::AddressMismatch {
                claimed: self.address,
                computed: expected,
            });
        }

        let key = Ed25519PublicKey::from_bytes(self.owner_key)
            .map_err(|_| BlockError::SignatureInvalid)?;
        let signature = Ed25519Signature::from_bytes(self.signature);
        key.verify(
            &Self::signing_bytes(self.direction, &self.username, &self.owner_key),
            &signature,
        )
        .map_err(|_| BlockError::SignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_reverse_blocks_land_at_different_addresses() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let forward = Ub::seal(&owner, Direction::Forward, "alice".to_string());
        let reverse = Ub::seal(&owner, Direction::Reverse, "alice".to_string());
        assert!(forward.validate().is_ok());
        assert!(reverse.validate().is_ok());
        assert_ne!(forward.address(), reverse.address());
        assert_eq!(forward.address(), Ub::forward_address("alice"));
        assert_eq!(reverse.address(), Ub::reverse_address(owner.public_key().as_bytes()));
    }

    #[test]
    fn tampered_username_fails_validation() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let mut ub = Ub::seal(&owner, Direction::Forward, "alice".to_string());
        ub.username = "mallory".to_string();
        assert!(matches!(ub.validate(), Err(BlockError::AddressMismatch { .. })));
    }
}
