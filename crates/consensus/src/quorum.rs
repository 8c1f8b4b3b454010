//! Quorum membership for a mutable address's Paxos group.
//!
//! The quorum itself is just another value the group's Paxos instance
//! can decide (`PaxosValue::Reconfigure`), so changing membership is
//! linearizable with concurrent writes: a reconfiguration and a write
//! racing for the same address go through the same acceptor promises.

use shared_types::NodeId;

/// The replica set currently running Paxos for one mutable address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quorum {
    pub members: Vec<NodeId>,
}

impl Quorum {
    pub fn new(members: Vec<NodeId>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    /// A reconfigured quorum with `dead` removed and `replacement`
    /// substituted in its place, preserving the remaining members'
    /// relative order (only the dead slot moves).
    pub fn replacing(&self, dead: NodeId, replacement: NodeId) -> Quorum {
        let members = self
            .members
            .iter()
            .map(|&id| if id == dead { replacement } else { id })
            .collect();
        Quorum::new(members)
    }

    /// Whether `self` and `other` share at least one member — the
    /// property quorum reconfiguration must preserve so that any value
    /// confirmed under one quorum remains observable through the next.
    pub fn overlaps(&self, other: &Quorum) -> bool {
        self.members.iter().any(|id| other.contains(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(bytes: &[u8]) -> Vec<NodeId> {
        bytes.iter().map(|&b| NodeId([b; 32])).collect()
    }

    #[test]
    fn replacing_substitutes_only_the_dead_member() {
        let quorum = Quorum::new(ids(&[1, 2, 3]));
        let replaced = quorum.replacing(NodeId([2u8; 32]), NodeId([9u8; 32]));
        assert_eq!(replaced.members, ids(&[1, 9, 3]));
    }

    #[test]
    fn consecutive_reconfigurations_always_overlap() {
        let q1 = Quorum::new(ids(&[1, 2, 3]));
        let q2 = q1.replacing(NodeId([2u8; 32]), NodeId([9u8; 32]));
        assert!(q1.overlaps(&q2));
    }

    #[test]
    fn disjoint_quorums_do_not_overlap() {
        let q1 = Quorum::new(ids(&[1, 2, 3]));
        let q2 = Quorum::new(ids(&[4, 5, 6]));
        assert!(!q1.overlaps(&q2));
    }
}
