//! The `ConflictResolver` hook: invoked when a Paxos round decides a
//! value other than the one the local caller proposed, i.e. a
//! concurrent writer won the race.

use block_model::{Acb, Block};
use shared_crypto::signatures::Ed25519KeyPair;

/// Given what the caller tried to write (`proposed`) and what Paxos
/// actually decided (`current`), either produce a new block to retry
/// the write with, or abstain (`None`) so the caller sees
/// [`crate::ConsensusError::Conflict`].
///
/// Resolvers are looked up by [`ConflictResolver::name`] rather than
/// serialized directly, so the async consensus journal (see
/// [`crate::async_consensus`]) can persist just the name and replay the
/// same resolver against the latest state after a restart.
pub trait ConflictResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// `proposed` and `current` are guaranteed to be the same address
    /// and the same block variant by the caller.
    fn resolve(&self, proposed: &Block, current: &Block) -> Option<Block>;
}

/// Default ACB resolver: re-applies the caller's payload and ACL edits
/// on top of whatever version Paxos actually decided, resealed with the
/// caller's own signing key and bumped one past the decided version.
pub struct AcbDeltaResolver {
    pub signer: Ed25519KeyPair,
}

impl AcbDeltaResolver {
    pub fn new(signer: Ed25519KeyPair) -> Self {
        Self { signer }
    }
}

impl ConflictResolver for AcbDeltaResolver {
    fn name(&self) -> &'static str {
        "acb-delta"
    }

    fn resolve(&self, proposed: &Block, current: &Block) -> Option<Block> {
        let (Block::Acb(proposed), Block::Acb(current)) = (proposed, current) else {
            return None;
        };
        if proposed.owner_key() != current.owner_key() {
            return None;
        }
        let payload = if proposed.is_encrypted() {
            proposed.open_payload(&self.signer).ok()?
        } else {
            proposed.raw_payload().to_vec()
        };
        let retried = Acb::seal(
            &self.signer,
            *current.owner_key(),
            current.version() + 1,
            payload,
            proposed.acl().clone(),
            proposed.is_encrypted(),
        );
        Some(Block::Acb(retried))
    }
}

/// A resolver that never accepts the new value: every conflict is
/// surfaced to the caller verbatim. The default when a write is issued
/// without an explicit resolver.
pub struct AbstainResolver;

impl ConflictResolver for AbstainResolver {
    fn name(&self) -> &'static str {
        "abstain"
    }

    fn resolve(&self, _proposed: &Block, _current: &Block) -> Option<Block> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_model::Acl;

    #[test]
    fn acb_delta_resolver_reseals_on_top_of_the_decided_version() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let current = Acb::seal(&owner, owner_key, 5, b"theirs".to_vec(), Acl::empty(), false);
        let proposed = Acb::seal(&owner, owner_key, 3, b"mine".to_vec(), Acl::empty(), false);

        let resolver = AcbDeltaResolver::new(Ed25519KeyPair::from_seed([1u8; 32]));
        let retried = resolver
            .resolve(&Block::Acb(proposed), &Block::Acb(current.clone()))
            .expect("acb conflicts always produce a retry");
        let Block::Acb(retried) = retried else { panic!("expected acb") };
        assert_eq!(retried.version(), current.version() + 1);
        assert_eq!(retried.raw_payload(), b"mine");
        assert!(retried.validate(Some(&current)).is_ok());
    }

    #[test]
    fn abstain_resolver_never_retries() {
        let owner = Ed25519KeyPair::from_seed([1u8; 32]);
        let owner_key = *owner.public_key().as_bytes();
        let current = Acb::seal(&owner, owner_key, 2, b"theirs".to_vec(), Acl::empty(), false);
        let proposed = Acb::seal(&owner, owner_key, 1, b"mine".to_vec(), Acl::empty(), false);
        assert!(AbstainResolver.resolve(&Block::Acb(proposed), &Block::Acb(current)).is_none());
    }
}
