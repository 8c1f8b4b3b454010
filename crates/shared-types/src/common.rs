//! # Common Value Aliases
//!
//! Small type aliases shared by every crate in the workspace so that a
//! hash, a public key, and a signature always mean the same bytes no
//! matter which crate produced them.

/// A 32-byte content hash (BLAKE3 or SHA-256 depending on call site).
pub type Hash = [u8; 32];

/// An Ed25519 public key.
pub type PublicKey = [u8; 32];

/// An Ed25519 signature.
pub type Signature = [u8; 64];

/// Unix timestamp, seconds since epoch.
pub type Timestamp = u64;

/// A monotonically increasing version number carried by every mutable block.
pub type Version = u64;

/// Identifies a node in the overlay / dock layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..")
    }
}
