//! Wire messages the consensus layer exchanges over [`dock::Peer::call`],
//! and the method names it registers under in the [`dock::RpcHandler`]
//! it hands the local `Dock`.

use block_model::{Block, RemoveSignature};
use serde::{Deserialize, Serialize};
use shared_types::{Address, PublicKey};

use crate::paxos::{Ballot, PaxosValue};

pub const METHOD_STORE_IMMUTABLE: &str = "consensus.store_immutable";
pub const METHOD_FETCH_IMMUTABLE: &str = "consensus.fetch_immutable";
pub const METHOD_REMOVE_IMMUTABLE: &str = "consensus.remove_immutable";
pub const METHOD_PAXOS_PREPARE: &str = "consensus.paxos_prepare";
pub const METHOD_PAXOS_ACCEPT: &str = "consensus.paxos_accept";
pub const METHOD_PAXOS_CONFIRM: &str = "consensus.paxos_confirm";
pub const METHOD_PAXOS_READ: &str = "consensus.paxos_read";

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreImmutableRequest {
    pub block: Block,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchImmutableRequest {
    pub address: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchImmutableResponse {
    pub block: Block,
}

/// `signer_key` accompanies the signature rather than living inside
/// [`RemoveSignature`] itself: a CHB records its owner as an `Address`
/// (the hash of that owner's mutable identity block), not a raw
/// public key, so the peer verifying a removal cannot recover the key
/// from the block alone. The caller supplies it; the handler checks it
/// hashes to the block's declared owner (CHB) or matches it directly
/// (NB/UB, which already store a `PublicKey`) before trusting the
/// signature.
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveImmutableRequest {
    pub signature: RemoveSignature,
    pub signer_key: PublicKey,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrepareRequest {
    pub address: Address,
    pub ballot: Ballot,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum PrepareResponse {
    /// The acceptor promised this ballot; carries whatever it had
    /// already accepted (if anything) so the proposer can adopt the
    /// highest-numbered prior value, and whatever it already saw
    /// confirmed (so a proposer can short-circuit a stale write).
    Promised {
        accepted: Option<(Ballot, PaxosValue)>,
        decided: Option<PaxosValue>,
    },
    /// A higher ballot has already been promised.
    Rejected { promised: Ballot },
    /// This peer has been evicted from, or never knew, this address's
    /// quorum.
    Unavailable,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptRequest {
    pub address: Address,
    pub ballot: Ballot,
    pub value: PaxosValue,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum AcceptResponse {
    Accepted,
    Rejected { promised: Ballot },
    /// The proposed value failed `Block::validate_against` the
    /// acceptor's currently decided instance (bad signature, a
    /// non-monotonic version, or a writer absent from the ACL) — no
    /// amount of ballot retrying will fix this, so the round gives up
    /// rather than looping.
    Invalid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub address: Address,
    pub ballot: Ballot,
    pub value: PaxosValue,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadRequest {
    pub address: Address,
    pub local_version: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ReadResponse {
    Value(Option<PaxosValue>),
    NoUpdate,
}
