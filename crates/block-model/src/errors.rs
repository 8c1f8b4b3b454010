//! Block validation errors.

use shared_types::Address;
use thiserror::Error;

/// Errors raised while sealing, validating, or authorizing a block.
///
/// Every variant here maps to the `ValidationFailed` kind at the model
/// facade boundary (see the workspace's §7 error taxonomy); the detail is
/// kept for logging and for peers that want to mark a suspicious writer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// The address recomputed from the payload does not match the
    /// block's declared address.
    #[error("address mismatch: block claims {claimed}, content hashes to {computed}")]
    AddressMismatch {
        /// Address declared by the block.
        claimed: Address,
        /// Address recomputed from its content.
        computed: Address,
    },

    /// A mutable block's payload signature does not verify against the
    /// key implied by its address (OKB/GB) or its ACL writer entry (ACB).
    #[error("signature verification failed")]
    SignatureInvalid,

    /// A write's version is not strictly greater than the block's
    /// current accepted version.
    #[error("version {new} is not greater than current version {current}")]
    VersionNotMonotonic {
        /// Version carried by the candidate write.
        new: u64,
        /// Version currently accepted for this address.
        current: u64,
    },

    /// The writer named by an ACB write does not hold `write = true` in
    /// the block's ACL.
    #[error("writer does not hold write permission in the ACL")]
    WriterNotAuthorized,

    /// The ACL's own integrity signature does not verify.
    #[error("ACL integrity signature failed to verify")]
    AclIntegrityFailed,

    /// A reader attempted to unwrap an ACB payload key without holding a
    /// read grant (or after that grant was revoked).
    #[error("no readable key-wrap entry for this key")]
    NoReadableKeyWrap,

    /// The block is mutable but carries no signature to check, or is
    /// immutable but carries one.
    #[error("block is missing a required field: {0}")]
    MalformedBlock(&'static str),

    /// A `RemoveSignature` does not verify against the expected signer
    /// for this address/version.
    #[error("remove signature does not verify")]
    RemoveSignatureInvalid,

    /// Symmetric decryption of an ACB payload failed (wrong key, or the
    /// ciphertext was tampered with).
    #[error("payload decryption failed: {0}")]
    DecryptionFailed(String),

    /// `bincode` failed to encode or decode a block envelope.
    #[error("wire codec failed: {0}")]
    WireCodec(String),
}
