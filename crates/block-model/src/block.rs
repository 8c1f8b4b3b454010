//! The tagged union over every block variant, used wherever code needs
//! to hold "a block" without committing to which kind.

use serde::{Deserialize, Serialize};
use shared_types::Address;

use shared_crypto::hashing::blake3_hash;
use shared_types::PublicKey;

use crate::acb::Acb;
use crate::chb::Chb;
use crate::errors::BlockError;
use crate::gb::Gb;
use crate::nb::Nb;
use crate::okb::Okb;
use crate::remove_signature::RemoveSignature;
use crate::ub::Ub;

/// Any block this crate knows how to validate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Block {
    Chb(Chb),
    Okb(Okb),
    Acb(Acb),
    Nb(Nb),
    Ub(Ub),
    Gb(Gb),
}

impl Block {
    pub fn address(&self) -> Address {
        match self {
            Block::Chb(b) => b.address(),
            Block::Okb(b) => b.address(),
            Block::Acb(b) => b.address(),
            Block::Nb(b) => b.address(),
            Block::Ub(b) => b.address(),
            Block::Gb(b) => b.address(),
        }
    }

    /// Whether this variant carries a version (OKB/ACB/GB do; CHB/NB/UB
    /// don't).
    pub fn version(&self) -> Option<u64> {
        match self {
            Block::Okb(b) => Some(b.version()),
            Block::Acb(b) => Some(b.version()),
            Block::Gb(b) => Some(b.version()),
            Block::Chb(_) | Block::Nb(_) | Block::Ub(_) => None,
        }
    }

    /// Self-consistency validation only (address derivation, signature
    /// chain). Does not enforce monotonic-version or writer-authorization
    /// against a previous instance — callers holding the previously
    /// accepted block should call the variant's own `validate(previous)`
    /// instead; [`validate_against`] does this generically.
    pub fn validate(&self) -> Result<(), BlockError> {
        match self {
            Block::Chb(b) => b.validate(),
            Block::Okb(b) => b.validate(None),
            Block::Acb(b) => b.validate(None),
            Block::Nb(b) => b.validate(),
            Block::Ub(b) => b.validate(),
            Block::Gb(b) => b.validate(None),
        }
    }

    /// Validate against the previously accepted instance at the same
    /// address, enforcing monotonic version and writer authorization for
    /// the mutable variants. `previous` must be the same variant as
    /// `self`, or this fails as malformed.
    pub fn validate_against(&self, previous: Option<&Block>) -> Result<(), BlockError> {
        match (self, previous) {
            (Block::Chb(b), _) => b.validate(),
            (Block::Nb(b), _) => b.validate(),
            (Block::Ub(b), _) => b.validate(),
            (Block::Okb(b), Some(Block::Okb(prev))) => b.validate(Some(prev)),
            (Block::Okb(b), None) => b.validate(None),
            (Block::Acb(b), Some(Block::Acb(prev))) => b.validate(Some(prev)),
            (Block::Acb(b), None) => b.validate(None),
            (Block::Gb(b), Some(Block::Gb(prev))) => b.validate(Some(prev)),
            (Block::Gb(b), None) => b.validate(None),
            _ => Err(BlockError::MalformedBlock(
                "previous instance is a different block variant",
            )),
        }
    }

    /// Whether this address's underlying variant is mutable (has
    /// versions and can be rewritten) or immutable (write-once).
    pub fn is_mutable(&self) -> bool {
        matches!(self, Block::Okb(_) | Block::Acb(_) | Block::Gb(_))
    }

    /// Check a [`RemoveSignature`] against the key authorized to delete
    /// this block.
    ///
    /// OKB/ACB/GB/NB/UB carry their owning key directly; a CHB instead
    /// declares its owner as an [`shared_types::Address`] (the hash of
    /// that owner's mutable identity block), so the caller must supply
    /// `signer_key` out of band and this additionally checks that it
    /// hashes to the declared owner.
    pub fn verify_remove_authorization(
        &self,
        signature: &RemoveSignature,
        signer_key: Option<PublicKey>,
    ) -> Result<(), BlockError> {
        let key = match self {
            Block::Chb(b) => {
                if b.owner_address().is_null() {
                    return Err(BlockError::RemoveSignatureInvalid);
                }
                let signer_key = signer_key.ok_or(BlockError::RemoveSignatureInvalid)?;
                let derived = shared_types::Address::new(blake3_hash(&signer_key), true);
                if derived != b.owner_address() {
                    return Err(BlockError::RemoveSignatureInvalid);
                }
                signer_key
            }
            Block::Okb(b) => *b.owner_key(),
            Block::Acb(b) => *b.owner_key(),
            Block::Gb(b) => *b.owner_key(),
            Block::Nb(b) => *b.owner_key(),
            Block::Ub(b) => *b.owner_key(),
        };
        signature.verify(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::signatures::Ed25519KeyPair;

    #[test]
    fn address_and_mutability_dispatch_by_variant() {
        let chb = Block::Chb(Chb::new(b"data".to_vec(), Address::NULL));
        assert!(!chb.is_mutable());
        assert!(chb.version().is_none());

        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let okb = Block::Okb(Okb::seal(&owner, 1, b"v1".to_vec()));
        assert!(okb.is_mutable());
        assert_eq!(okb.version(), Some(1));
    }

    #[test]
    fn validate_against_rejects_mismatched_variants() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let okb = Block::Okb(Okb::seal(&owner, 2, b"v2".to_vec()));
        let chb = Block::Chb(Chb::new(b"data".to_vec(), Address::NULL));
        assert!(matches!(
            okb.validate_against(Some(&chb)),
            Err(BlockError::MalformedBlock(_))
        ));
    }

    #[test]
    fn okb_remove_is_authorized_by_its_own_owner_key() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let okb = Block::Okb(Okb::seal(&owner, 1, b"v1".to_vec()));
        let sig = RemoveSignature::sign_mutable(&owner, okb.address(), 1);
        assert!(okb.verify_remove_authorization(&sig, None).is_ok());
    }

    #[test]
    fn chb_remove_requires_the_declared_owner_key() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let owner_address = Address::new(blake3_hash(&owner_key), true);
        let chb = Block::Chb(Chb::new(b"data".to_vec(), owner_address));
        let sig = RemoveSignature::sign_immutable(&owner, chb.address());
        assert!(chb.verify_remove_authorization(&sig, Some(owner_key)).is_ok());

        let impostor = Ed25519KeyPair::from_seed([2u8; 32]);
        let impostor_key = *impostor.public_key().as_bytes();
        assert!(chb
            .verify_remove_authorization(&sig, Some(impostor_key))
            .is_err());
    }

    #[test]
    fn chb_with_no_declared_owner_cannot_be_removed() {
        let signer = Ed25519KeyPair::from_seed([1u8; 32]);
        let chb = Block::Chb(Chb::new(b"data".to_vec(), Address::NULL));
        let sig = RemoveSignature::sign_immutable(&signer, chb.address());
        assert!(chb
            .verify_remove_authorization(&sig, Some(*signer.public_key().as_bytes()))
            .is_err());
    }
}
