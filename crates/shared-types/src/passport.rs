//! # Passport
//!
//! A signed capability asserting a user's rights within a network. A peer
//! refuses RPCs from a principal whose passport does not verify, or whose
//! capabilities don't match the attempted operation.

use crate::common::{PublicKey, Signature};
use serde::{Deserialize, Serialize};
use shared_crypto::signatures::{Ed25519PublicKey, Ed25519Signature};

/// The rights a [`Passport`] grants its holder within a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// May author writes (insert/update/remove) against the network.
    pub allow_write: bool,
    /// May contribute a local silo to the network's replica sets.
    pub allow_storage: bool,
    /// May sign on behalf of the network owner (delegated certification).
    pub allow_sign: bool,
}

impl Capabilities {
    /// Full rights, granted to a network's own owner.
    pub const OWNER: Capabilities = Capabilities {
        allow_write: true,
        allow_storage: true,
        allow_sign: true,
    };

    /// Read-only rights: no write, no storage contribution, no delegation.
    pub const READ_ONLY: Capabilities = Capabilities {
        allow_write: false,
        allow_storage: false,
        allow_sign: false,
    };
}

/// A signed capability tying a user's public key to a network.
///
/// Issued by the network owner, or by a delegate holding `allow_sign`.
/// `signature` covers `(user_key, network_name, capabilities)` under the
/// issuer's private key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passport {
    /// The public key this passport authorizes.
    pub user_key: PublicKey,
    /// The network this passport is valid within.
    pub network_name: String,
    /// The rights granted to `user_key`.
    pub capabilities: Capabilities,
    /// Public key of the issuer (network owner or a certifier).
    pub issuer_key: PublicKey,
    /// Signature over `(user_key, network_name, capabilities)` by `issuer_key`.
    pub signature: Signature,
}

impl Passport {
    /// The bytes that `signature` is computed over.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + self.network_name.len() + 3);
        buf.extend_from_slice(&self.user_key);
        buf.extend_from_slice(self.network_name.as_bytes());
        buf.push(self.capabilities.allow_write as u8);
        buf.push(self.capabilities.allow_storage as u8);
        buf.push(self.capabilities.allow_sign as u8);
        buf
    }

    /// Verify the passport's signature against its claimed issuer, then
    /// confirm the issuer itself is the expected network owner (or a
    /// certifier the caller already trusts).
    ///
    /// A certifier chain is out of scope here; only direct network-owner
    /// issuance is verified at this layer.
    pub fn verify(&self, network_owner: &PublicKey) -> bool {
        if &self.issuer_key != network_owner {
            return false;
        }
        let Ok(issuer) = Ed25519PublicKey::from_bytes(self.issuer_key) else {
            return false;
        };
        let signature = Ed25519Signature::from_bytes(self.signature);
        issuer.verify(&self.signing_bytes(), &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_signature_never_verifies() {
        let passport = Passport {
            user_key: [1u8; 32],
            network_name: "net".into(),
            capabilities: Capabilities::READ_ONLY,
            issuer_key: [2u8; 32],
            signature: [0u8; 64],
        };
        assert!(!passport.verify(&[2u8; 32]));
    }

    #[test]
    fn wrong_issuer_never_verifies() {
        let passport = Passport {
            user_key: [1u8; 32],
            network_name: "net".into(),
            capabilities: Capabilities::READ_ONLY,
            issuer_key: [2u8; 32],
            signature: [9u8; 64],
        };
        assert!(!passport.verify(&[3u8; 32]));
    }

    #[test]
    fn properly_signed_passport_verifies() {
        use shared_crypto::signatures::Ed25519KeyPair;

        let network_owner = Ed25519KeyPair::from_seed([7u8; 32]);
        let mut passport = Passport {
            user_key: [1u8; 32],
            network_name: "acme".into(),
            capabilities: Capabilities::OWNER,
            issuer_key: *network_owner.public_key().as_bytes(),
            signature: [0u8; 64],
        };
        let signature = network_owner.sign(&passport.signing_bytes());
        passport.signature = *signature.as_bytes();

        assert!(passport.verify(network_owner.public_key().as_bytes()));
    }

    #[test]
    fn tampered_capabilities_fail_verification() {
        use shared_crypto::signatures::Ed25519KeyPair;

        let network_owner = Ed25519KeyPair::from_seed([7u8; 32]);
        let mut passport = Passport {
            user_key: [1u8; 32],
            network_name: "acme".into(),
            capabilities: Capabilities::READ_ONLY,
            issuer_key: *network_owner.public_key().as_bytes(),
            signature: [0u8; 64],
        };
        let signature = network_owner.sign(&passport.signing_bytes());
        passport.signature = *signature.as_bytes();

        passport.capabilities = Capabilities::OWNER;
        assert!(!passport.verify(network_owner.public_key().as_bytes()));
    }
}
