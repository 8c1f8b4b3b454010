//! Authorization to delete a block.

use serde::{Deserialize, Serialize};
use shared_crypto::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_types::Address;

use crate::errors::BlockError;

/// Proof that the caller is authorized to delete a block.
///
/// For a CHB, the owner signs `(address, "remove")`. For a mutable
/// block, the current version holder signs `(address, version)`. Peers
/// verify one of these before applying a remove.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoveSignature {
    /// Address being removed.
    pub address: Address,
    /// `Some(version)` for mutable blocks; `None` for CHBs, where the
    /// signed message is the literal string `"remove"` instead.
    pub version: Option<u64>,
    /// Signature over [`RemoveSignature::signing_bytes`].
    pub signature: [u8; 64],
}

impl RemoveSignature {
    /// The bytes a signer must sign to authorize removal.
    pub fn signing_bytes(address: &Address, version: Option<u64>) -> Vec<u8> {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(address.as_bytes());
        match version {
            Some(v) => buf.extend_from_slice(&v.to_be_bytes()),
            None => buf.extend_from_slice(b"remove"),
        }
        buf
    }

    /// Sign a removal of `address` (immutable variant: no version) with
    /// `signer`.
    pub fn sign_immutable(signer: &Ed25519KeyPair, address: Address) -> Self {
        let bytes = Self::signing_bytes(&address, None);
        let signature = signer.sign(&bytes);
        RemoveSignature {
            address,
            version: None,
            signature: *signature.as_bytes(),
        }
    }

    /// Sign a removal of `address` at `version` with `signer`.
    pub fn sign_mutable(signer: &Ed25519KeyPair, address: Address, version: u64) -> Self {
        let bytes = Self::signing_bytes(&address, Some(version));
        let signature = signer.sign(&bytes);
        RemoveSignature {
            address,
            version: Some(version),
            signature: *signature.as_bytes(),
        }
    }

    /// Verify this signature was produced by `signer_key` over this
    /// exact `(address, version)` pair.
    pub fn verify(&self, signer_key: &[u8; 32]) -> Result<(), BlockError> {
        let key =
            Ed25519PublicKey::from_bytes(*signer_key).map_err(|_| BlockError::SignatureInvalid)?;
        let bytes = Self::signing_bytes(&self.address, self.version);
        let signature = Ed25519Signature::from_bytes(self.signature);
        key.verify(&bytes, &signature)
            .map_err(|_| BlockError::RemoveSignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_remove_signature_round_trips() {
        let signer = Ed25519KeyPair::from_seed([9u8; 32]);
        let addr = Address::random(false);
        let sig = RemoveSignature::sign_immutable(&signer, addr);
        assert!(sig.verify(signer.public_key().as_bytes()).is_ok());
    }

    #[test]
    fn mutable_remove_signature_is_bound_to_its_version() {
        let signer = Ed25519KeyPair::from_seed([9u8; 32]);
        let addr = Address::random(true);
        let sig = RemoveSignature::sign_mutable(&signer, addr, 3);

        assert!(sig.verify(signer.public_key().as_bytes()).is_ok());

        let forged = RemoveSignature {
            version: Some(4),
            ..sig
        };
        assert!(forged.verify(signer.public_key().as_bytes()).is_err());
    }

    #[test]
    fn wrong_signer_fails_verification() {
        let signer = Ed25519KeyPair::from_seed([9u8; 32]);
        let impostor = Ed25519KeyPair::from_seed([10u8; 32]);
        let addr = Address::random(false);
        let sig = RemoveSignature::sign_immutable(&signer, addr);
        assert!(sig.verify(impostor.public_key().as_bytes()).is_err());
    }
}
