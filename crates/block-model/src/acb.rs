//! Access-Controlled Block: an OKB with an embedded ACL and optional
//! payload encryption.

use serde::{Deserialize, Serialize};
use shared_crypto::hashing::{blake3_derive_key, blake3_hash};
use shared_crypto::signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use shared_crypto::symmetric::{decrypt, encrypt, Nonce, SecretKey};
use shared_types::{Address, PublicKey};

use crate::acl::Acl;
use crate::errors::BlockError;

/// A mutable block writable by its owner or by any ACL entry holding
/// `write = true`.
///
/// **Key-wrap caveat.** Per-grantee wraps below are derived directly from
/// the grantee's public key (`blake3_derive_key`), not from an
/// authenticated key exchange — anyone who knows a grantee's public key
/// can recompute the same wrap. This stands in for the X25519 handshake
/// a production deployment would run per ACL entry; it is enough to make
/// the ACL *bookkeeping* testable (a revoked entry truly can't unwrap,
/// since its wrap is deleted along with it) without implementing a second
/// key-agreement primitive. Recorded in DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Acb {
    address: Address,
    owner_key: PublicKey,
    version: u64,
    acl: Acl,
    /// Ciphertext (if `encrypted`) or plaintext payload. Encrypted
    /// payloads are stored as `nonce (24 bytes) ‖ ciphertext`.
    payload: Vec<u8>,
    encrypted: bool,
    /// The block's symmetric key, wrapped for the owner. Present only
    /// when `encrypted`.
    owner_token: Option<Vec<u8>>,
    writer_key: PublicKey,
    signature: [u8; 64],
}

impl Acb {
    /// Derive the address an ACB for `owner_key` would have (identical
    /// derivation to OKB).
    pub fn address_for(owner_key: &PublicKey) -> Address {
        Address::new(blake3_hash(owner_key), true)
    }

    fn signing_bytes(
        version: u64,
        encrypted: bool,
        payload: &[u8],
        acl: &Acl,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + payload.len());
        buf.extend_from_slice(&version.to_be_bytes());
        buf.push(encrypted as u8);
        buf.extend_from_slice(payload);
        buf.extend_from_slice(&bincode::serialize(acl).unwrap_or_default());
        buf
    }

    fn wrap_key_for(recipient: &PublicKey, address: &Address, master: &SecretKey) -> Vec<u8> {
        let kek = blake3_derive_key("memoria acb key-wrap v1", recipient);
        let kek = SecretKey::from_bytes(kek);
        // Encrypt the master key itself; reuse the AEAD rather than a
        // bespoke wrap primitive. address bytes bind the wrap to this
        // block so two ACBs never share a wrapped blob by accident.
        let mut plaintext = master.as_bytes().to_vec();
        plaintext.extend_from_slice(address.as_bytes());
        let (ciphertext, nonce) = encrypt(&kek, &plaintext).expect("acb key wrap");
        let mut out = nonce.as_bytes().to_vec();
        out.extend_from_slice(&ciphertext);
        out
    }

    fn unwrap_key_for(
        recipient: &PublicKey,
        address: &Address,
        wrapped: &[u8],
    ) -> Result<SecretKey, BlockError> {
        let kek = blake3_derive_key("memoria acb key-wrap v1", recipient);
        let kek = SecretKey::from_bytes(kek);
        if wrapped.len() < 24 {
            return Err(BlockError::MalformedBlock("wrapped key too short"));
        }
        let (nonce_bytes, ciphertext) = wrapped.split_at(24);
        let mut nonce_arr = [0u8; 24];
        nonce_arr.copy_from_slice(nonce_bytes);
        let nonce = Nonce::from_bytes(nonce_arr);
        let plaintext = decrypt(&kek, ciphertext, &nonce)
            .map_err(|e| BlockError::DecryptionFailed(e.to_string()))?;
        if plaintext.len() != 32 + 32 || &plaintext[32..] != address.as_bytes() {
            return Err(BlockError::DecryptionFailed("wrap bound to wrong address".into()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&plaintext[..32]);
        Ok(SecretKey::from_bytes(key))
    }

    /// Seal a new version of this block. `writer` signs it; it must be
    /// the owner or hold `write = true` in `acl` for the validator to
    /// later accept it. When `encrypt_payload` is set, a fresh random
    /// key is generated, the payload is sealed under it, and the key is
    /// wrapped for the owner and for every ACL entry with `read = true`.
    #[allow(clippy::too_many_arguments)]
    pub fn seal(
        writer: &Ed25519KeyPair,
        owner_key: PublicKey,
        version: u64,
        payload: Vec<u8>,
        mut acl: Acl,
        encrypt_payload: bool,
    ) -> Self {
        let address = Self::address_for(&owner_key);

        let (stored_payload, owner_token) = if encrypt_payload {
            let master = SecretKey::generate();
            let (ciphertext, nonce) = encrypt(&master, &payload).expect("acb payload encrypt");
            let mut stored = nonce.as_bytes().to_vec();
            stored.extend_from_slice(&ciphertext);

            for entry in acl.entries.iter_mut().filter(|e| e.read) {
                entry.wrapped_key = Some(Self::wrap_key_for(&entry.public_key, &address, &master));
            }
            let owner_token = Self::wrap_key_for(&owner_key, &address, &master);
            (stored, Some(owner_token))
        } else {
            (payload, None)
        };

        let signature = writer.sign(&Self::signing_bytes(
            version,
            encrypt_payload,
            &stored_payload,
            &acl,
        ));

        Acb {
            address,
            owner_key,
            version,
            acl,
            payload: stored_payload,
            encrypted: encrypt_payload,
            owner_token,
            writer_key: *writer.public_key().as_bytes(),
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

    /// The owner's public key (equivalently, `H(owner_key) == address`).
    pub fn owner_key(&self) -> &PublicKey {
        &self.owner_key
    }

    /// The embedded ACL.
    pub fn acl(&self) -> &Acl {
        &self.acl
    }

    /// Mutable access to the ACL, for `permissions(key, read, write)`
    /// edits ahead of resealing a new version.
    pub fn acl_mut(&mut self) -> &mut Acl {
        &mut self.acl
    }

    /// Whether the payload is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The raw stored payload (ciphertext if encrypted).
    pub fn raw_payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decrypt the payload for `recipient`, who must be the owner or
    /// hold a readable key-wrap entry. Returns the plaintext unchanged
    /// if the block isn't encrypted.
    pub fn open_payload(&self, recipient: &Ed25519KeyPair) -> Result<Vec<u8>, BlockError> {
        if !self.encrypted {
            return Ok(self.payload.clone());
        }
        let recipient_key = *recipient.public_key().as_bytes();

        let master = if recipient_key == self.owner_key {
            let token = self
                .owner_token
                .as_ref()
                .ok_or(BlockError::NoReadableKeyWrap)?;
            Self::unwrap_key_for(&recipient_key, &self.address, token)?
        } else {
            let entry = self
                .acl
                .entry_for(&recipient_key)
                .filter(|e| e.read)
                .ok_or(BlockError::NoReadableKeyWrap)?;
            let wrapped = entry.wrapped_key.as_ref().ok_or(BlockError::NoReadableKeyWrap)?;
            Self::unwrap_key_for(&recipient_key, &self.address, wrapped)?
        };

        if self.payload.len() < 24 {
            return Err(BlockError::MalformedBlock("encrypted payload too short"));
        }
        let (nonce_bytes, ciphertext) = self.payload.split_at(24);
        let mut nonce_arr = [0u8; 24];
        nonce_arr.copy_from_slice(nonce_bytes);
        let nonce = Nonce::from_bytes(nonce_arr);
        decrypt(&master, ciphertext, &nonce).map_err(|e| BlockError::DecryptionFailed(e.to_string()))
    }

    /// Validate self-consistency, the writer's authorization, and (if
    /// `previous` is given) the monotonic-version invariant.
    ///
    /// Write authorization is checked against `previous`'s ACL (rights
    /// must have been granted before this write landed); the very first
    /// write (`previous = None`) must come from the owner.
    pub fn validate(&self, previous: Option<&Acb>) -> Result<(), BlockError> {
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
            &Self::signing_bytes(self.version, self.encrypted, &self.payload, &self.acl),
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
                if !is_owner && !previous.acl.can_write(&self.writer_key) {
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
    fn owner_can_seal_initial_plaintext_version() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let acb = Acb::seal(&owner, owner_key, 1, b"hello".to_vec(), Acl::empty(), false);
        assert!(acb.validate(None).is_ok());
        assert_eq!(acb.raw_payload(), b"hello");
    }

    #[test]
    fn delegate_with_write_right_may_author_next_version() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let delegate = Ed25519KeyPair::from_seed([2u8; 32]);
        let delegate_key = *delegate.public_key().as_bytes();

        let mut acl = Acl::empty();
        acl.set_permissions(delegate_key, true, true);
        let v1 = Acb::seal(&owner, owner_key, 1, b"v1".to_vec(), acl, false);
        assert!(v1.validate(None).is_ok());

        let v2 = Acb::seal(&delegate, owner_key, 2, b"v2".to_vec(), v1.acl.clone(), false);
        assert!(v2.validate(Some(&v1)).is_ok());
    }

    #[test]
    fn writer_without_grant_is_rejected() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let stranger = Ed25519KeyPair::from_seed([3u8; 32]);

        let v1 = Acb::seal(&owner, owner_key, 1, b"v1".to_vec(), Acl::empty(), false);
        let v2 = Acb::seal(&stranger, owner_key, 2, b"v2".to_vec(), Acl::empty(), false);
        assert!(matches!(
            v2.validate(Some(&v1)),
            Err(BlockError::WriterNotAuthorized)
        ));
    }

    #[test]
    fn encrypted_payload_opens_for_owner_and_grantee_but_not_outsider() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let alice = Ed25519KeyPair::from_seed([4u8; 32]);
        let alice_key = *alice.public_key().as_bytes();
        let stranger = Ed25519KeyPair::from_seed([5u8; 32]);

        let mut acl = Acl::empty();
        acl.set_permissions(alice_key, true, false);
        let acb = Acb::seal(&owner, owner_key, 1, b"secret".to_vec(), acl, true);

        assert_eq!(acb.open_payload(&owner).unwrap(), b"secret");
        assert_eq!(acb.open_payload(&alice).unwrap(), b"secret");
        assert!(matches!(
            acb.open_payload(&stranger),
            Err(BlockError::NoReadableKeyWrap)
        ));
    }

    #[test]
    fn acl_revoke_locks_out_the_former_grantee() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let alice = Ed25519KeyPair::from_seed([4u8; 32]);
        let alice_key = *alice.public_key().as_bytes();

        let mut acl = Acl::empty();
        acl.set_permissions(alice_key, true, false);
        let v1 = Acb::seal(&owner, owner_key, 1, b"secret".to_vec(), acl.clone(), true);
        assert!(v1.open_payload(&alice).is_ok());

        acl.revoke(&alice_key);
        let v2 = Acb::seal(&owner, owner_key, 2, b"secret-v2".to_vec(), acl, true);
        assert!(matches!(
            v2.open_payload(&alice),
            Err(BlockError::NoReadableKeyWrap)
        ));
    }
}
