//! Ballot numbers, proposed values, and the per-address acceptor
//! bookkeeping a Multi-Paxos round is built from.

use std::collections::HashMap;

use block_model::Block;
use serde::{Deserialize, Serialize};
use shared_types::{Address, NodeId};

/// `(counter, proposer)`, compared lexicographically so ballots from
/// the same counter still total-order on node id: no two proposers ever
/// pick the same ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ballot {
    pub counter: u64,
    pub proposer: NodeId,
}

impl Ballot {
    pub fn initial(proposer: NodeId) -> Self {
        Ballot { counter: 0, proposer }
    }

    /// The smallest ballot strictly greater than `self`, still
    /// attributed to `proposer`.
    pub fn next(self, proposer: NodeId) -> Self {
        Ballot { counter: self.counter + 1, proposer }
    }
}

/// What a Paxos instance for a mutable address decides: either a new
/// block version, or (for quorum reconfiguration) a replacement member
/// list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaxosValue {
    Write(Block),
    Reconfigure(Vec<NodeId>),
}

impl PaxosValue {
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            PaxosValue::Write(block) => Some(block),
            PaxosValue::Reconfigure(_) => None,
        }
    }
}

/// One acceptor's state for one address: the highest ballot it has
/// promised not to ignore, the highest-numbered value it has accepted
/// (if any), and the value it has seen confirmed (if any).
#[derive(Debug, Clone, Default)]
pub struct AcceptorRecord {
    pub promised: Option<Ballot>,
    pub accepted: Option<(Ballot, PaxosValue)>,
    pub decided: Option<PaxosValue>,
}

impl AcceptorRecord {
    pub fn decided_block(&self) -> Option<&Block> {
        self.decided.as_ref().and_then(PaxosValue::as_block)
    }
}

/// Acceptor bookkeeping for every address this node currently
/// participates in a Paxos group for, with one `tokio::sync::Mutex` per
/// address so at most one round is ever in flight locally for a given
/// address, matching the per-address serialization the model layer
/// promises its callers.
#[derive(Default)]
pub struct AcceptorTable {
    records: parking_lot::Mutex<HashMap<Address, std::sync::Arc<tokio::sync::Mutex<AcceptorRecord>>>>,
}

impl AcceptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, address: Address) -> std::sync::Arc<tokio::sync::Mutex<AcceptorRecord>> {
        self.records
            .lock()
            .entry(address)
            .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(AcceptorRecord::default())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballots_order_by_counter_then_proposer() {
        let a = Ballot { counter: 1, proposer: NodeId([1u8; 32]) };
        let b = Ballot { counter: 1, proposer: NodeId([2u8; 32]) };
        let c = Ballot { counter: 2, proposer: NodeId([0u8; 32]) };
        assert!(a < b);
        assert!(b < c);
    }

    #[tokio::test]
    async fn acceptor_table_hands_out_the_same_mutex_for_an_address() {
        let table = AcceptorTable::new();
        let addr = Address::random(true);
        let a = table.entry(addr);
        let b = table.entry(addr);
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }
}
