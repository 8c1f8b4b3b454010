//! Group Block: a mutable block shaped like an OKB but carrying a group
//! key list and an admin ACL, writable by any admin.

use serde::{Deserialize, Serialize};
use shared_crypto::hashing::blake3_hash;
use shared_crypto::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::{Address, PublicKey};

use crate::acl::Acl;
use crate::errors::BlockError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gb {
    address: Address,
    owner_key: PublicKey,
    version: u64,
    /// Members of the group, as their public keys.
    group_keys: Vec<PublicKey>,
    /// Who may author a new version of this block (beyond the owner).
    admin_acl: Acl,
    payload: Vec<u8>,
    writer_key: PublicKey,
    signature: [u8; 64],
}

impl Gb {
    /// Derive the address a GB for `owner_key` would have (identical
    /// derivation to OKB/ACB).
    pub fn address_for(owner_key: &PublicKey) -> Address {
        Address::new(blake3_hash(owner_key), true)
    }

    fn signing_bytes(
        version: u64,
        group_keys: &[PublicKey],
        admin_acl: &Acl,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + group_keys.len() * 32 + payload.len());
        buf.extend_from_slice(&version.to_be_bytes());
        for key in group_keys {
            buf.extend_from_slice(key);
        }
        buf.extend_from_slice(&bincode::serialize(admin_acl).unwrap_or_default());
        buf.extend_from_slice(payload);
        buf
    }

    /// Seal a new version, signed by `writer` (the owner or an admin).
    pub fn seal(
        writer: &Ed25519KeyPair,
        owner_key: PublicKey,
        version: u64,
        group_keys: Vec<PublicKey>,
        admin_acl: Acl,
        payload: Vec<u8>,
    ) -> Self {
        let signature = writer.sign(&Self::signing_bytes(version, &group_keys, &admin_acl, &payload));
        Gb {
            address: Self::address_for(&owner_key),
            owner_key,
            version,
            group_keys,
            admin_acl,
            payload,
            writer_key: *writer.public_key().as_bytes(),
            signature: *signature.as_bytes(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn owner_key(&self) -> &PublicKey {
        &self.owner_key
    }

    pub fn group_keys(&self) -> &[PublicKey] {
        &self.group_keys
    }

    pub fn admin_acl(&self) -> &Acl {
        &self.admin_acl
    }

    pub fn admin_acl_mut(&mut self) -> &mut Acl {
        &mut self.admin_acl
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_member(&self, key: &PublicKey) -> bool {
        self.group_keys.contains(key)
    }

    /// Validate self-consistency, the writer's authorization (owner or
    /// admin per `previous`'s ACL), and the monotonic-version invariant.
    pub fn validate(&self, previous: Option<&Gb>) -> Result<(), BlockError> {
        let expected = Self::address_for(&self.owner_key);
        if expected != self.address {
            return Err(BlockError::AddressMismatch {
                claimed: self.address,
                computed: expected,
            });
        }

        let key = Ed25519PublicKey::from_bytes(self.writer_key)
            .map_err(|_| BlockError::SignatureInvalid)?;
        let signature = Ed25519Signature::from_bytes(self.signature);
        key.verify(
            &Self::signing_bytes(self.version, &self.group_keys, &self.admin_acl, &self.payload),
            &signature,
        )
        .map_err(|_| BlockError::SignatureInvalid)?;

        let is_owner = self.writer_key == self.owner_key;
        match previous {
            Some(previous) => {
                if self.version <= previous.version {
                    return Err(BlockError::VersionNotMonotonic {
                        new: self.version,
                        current: previous.version,
                    });
                }
                if !is_owner && !previous.admin_acl.can_write(&self.writer_key) {
                    return Err(BlockError::WriterNotAuthorized);
                }
            }
            None => {
                if !is_owner {
                    return Err(BlockError::WriterNotAuthorized);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_creates_the_group() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let gb = Gb::seal(&owner, owner_key, 1, vec![owner_key], Acl::empty(), b"group".to_vec());
        assert!(gb.validate(None).is_ok());
        assert!(gb.is_member(&owner_key));
    }

    #[test]
    fn admin_may_add_a_member_in_the_next_version() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let admin = Ed25519KeyPair::from_seed([2u8; 32]);
        let admin_key = *admin.public_key().as_bytes();
        let member = Ed25519KeyPair::from_seed([3u8; 32]);
        let member_key = *member.public_key().as_bytes();

        let mut acl = Acl::empty();
        acl.set_permissions(admin_key, true, true);
        let v1 = Gb::seal(&owner, owner_key, 1, vec![owner_key], acl, b"group".to_vec());

        let v2 = Gb::seal(
            &admin,
            owner_key,
            2,
            vec![owner_key, member_key],
            v1.admin_acl.clone(),
            b"group".to_vec(),
        );
        assert!(v2.validate(Some(&v1)).is_ok());
        assert!(v2.is_member(&member_key));
    }

    #[test]
    fn non_admin_write_is_rejected() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let stranger = Ed25519KeyPair::from_seed([4u8; 32]);

        let v1 = Gb::seal(&owner, owner_key, 1, vec![owner_key], Acl::empty(), b"group".to_vec());
        let v2 = Gb::seal(&stranger, owner_key, 2, vec![owner_key], Acl::empty(), b"group".to_vec());
        assert!(matches!(
            v2.validate(Some(&v1)),
            Err(BlockError::WriterNotAuthorized)
        ));
    }
}
