//! §8 "OKB versioning": a concurrent writer racing against an already
//! confirmed version either surfaces `Conflict`, or is reconciled and
//! retried by a [`ConflictResolver`] — both exercised against a real
//! 3-node Paxos quorum over TCP, not a single in-process acceptor.

use std::sync::Arc;

use block_model::{Block, Okb};
use consensus::{Consensus, ConsensusError};
use shared_crypto::signatures::Ed25519KeyPair;

use crate::cluster::TestCluster;

const FACTOR: usize = 3;

/// Re-seals the caller's payload on top of whatever version Paxos
/// actually decided. Mirrors [`consensus::AcbDeltaResolver`] for the
/// OKB variant, which has no built-in delta resolver of its own.
struct OkbBumpResolver {
    owner: Ed25519KeyPair,
    retry_payload: Vec<u8>,
}

impl consensus::ConflictResolver for OkbBumpResolver {
    fn name(&self) -> &'static str {
        "okb-bump"
    }

    fn resolve(&self, _proposed: &Block, current: &Block) -> Option<Block> {
        let Block::Okb(current) = current else { return None };
        Some(Block::Okb(Okb::seal(&self.owner, current.version() + 1, self.retry_payload.clone())))
    }
}

#[tokio::test]
async fn sequential_updates_increment_the_version_everyone_agrees_on() {
    let cluster = TestCluster::start(3).await;
    let owner = Ed25519KeyPair::from_seed([42u8; 32]);

    let consensus = cluster.nodes[0].consensus(cluster.overlay.clone(), FACTOR);
    let v1 = Block::Okb(Okb::seal(&owner, 1, b"v1".to_vec()));
    consensus.insert(v1.clone()).await.unwrap();

    let v2 = Block::Okb(Okb::seal(&owner, 2, b"v2".to_vec()));
    let committed = consensus.update(v2.clone(), None).await.unwrap();
    assert_eq!(committed, v2);

    for node in &cluster.nodes {
        let fetched = node.consensus(cluster.overlay.clone(), FACTOR).fetch(v1.address()).await.unwrap();
        assert_eq!(fetched, v2);
    }
}

#[tokio::test]
async fn a_stale_concurrent_write_without_a_resolver_surfaces_conflict() {
    let cluster = TestCluster::start(3).await;
    let owner = Ed25519KeyPair::from_seed([7u8; 32]);

    let consensus = cluster.nodes[0].consensus(cluster.overlay.clone(), FACTOR);
    consensus.insert(Block::Okb(Okb::seal(&owner, 1, b"v1".to_vec()))).await.unwrap();
    consensus
        .update(Block::Okb(Okb::seal(&owner, 2, b"v2".to_vec())), None)
        .await
        .unwrap();

    // A third writer that never saw the v2 commit, still proposing its
    // own version 2 with different content.
    let stale = Block::Okb(Okb::seal(&owner, 2, b"v3-stale-base".to_vec()));
    let err = consensus.update(stale, None).await.unwrap_err();
    assert!(matches!(err, ConsensusError::Conflict { .. }));
}

#[tokio::test]
async fn the_same_stale_write_with_a_resolver_retries_and_succeeds_at_the_next_version() {
    let cluster = TestCluster::start(3).await;
    let owner = Ed25519KeyPair::from_seed([7u8; 32]);

    let consensus = cluster.nodes[0].consensus(cluster.overlay.clone(), FACTOR);
    consensus.insert(Block::Okb(Okb::seal(&owner, 1, b"v1".to_vec()))).await.unwrap();
    consensus
        .update(Block::Okb(Okb::seal(&owner, 2, b"v2".to_vec())), None)
        .await
        .unwrap();

    let stale = Block::Okb(Okb::seal(&owner, 2, b"v3".to_vec()));
    let resolver = Arc::new(OkbBumpResolver { owner: owner.clone(), retry_payload: b"v3".to_vec() });
    let committed = consensus.update(stale, Some(resolver)).await.unwrap();

    let Block::Okb(okb) = &committed else { panic!("expected okb") };
    assert_eq!(okb.version(), 3);
    assert_eq!(okb.payload(), b"v3");
}

#[tokio::test]
async fn writes_to_distinct_addresses_do_not_block_each_other() {
    let cluster = TestCluster::start(3).await;
    let alice = Ed25519KeyPair::from_seed([1u8; 32]);
    let bob = Ed25519KeyPair::from_seed([2u8; 32]);

    let consensus = cluster.nodes[0].consensus(cluster.overlay.clone(), FACTOR);
    let (a, b) = tokio::join!(
        consensus.insert(Block::Okb(Okb::seal(&alice, 1, b"alice-v1".to_vec()))),
        consensus.insert(Block::Okb(Okb::seal(&bob, 1, b"bob-v1".to_vec())))
    );
    a.unwrap();
    b.unwrap();
}
