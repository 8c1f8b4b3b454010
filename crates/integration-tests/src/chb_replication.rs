//! §8 "Replication tolerance": a content-hashed block spread across a
//! real 4-node TCP cluster survives the loss of replicas up to (and
//! just past) the point the spec says it should.
//!
//! The cluster runs 4 nodes with a replication factor of 3 so that the
//! calling node itself is never automatically one of the address's
//! owners — replication is actually exercised over the wire rather than
//! short-circuited by the caller's own local copy.

use std::time::Duration;

use block_model::{Block, Chb};
use consensus::{Consensus, ConsensusError};
use shared_types::Address;

use crate::cluster::TestCluster;

const FACTOR: usize = 3;

/// A CHB whose address's owner-selection byte routes Stonehenge's
/// cyclic ownership to nodes `[1, 2, 3]`, leaving node 0 a pure client
/// for every test in this module.
fn chb_owned_by_nodes_one_two_three(payload: &[u8]) -> Block {
    loop {
        let chb = Chb::new(payload.to_vec(), Address::NULL);
        if chb.address().as_bytes()[0] % 4 == 1 {
            return Block::Chb(chb);
        }
        // Practically never loops: CHB salt is random per call, so the
        // address's owner byte is uniform over 0..4.
    }
}

#[tokio::test]
async fn chb_round_trips_across_every_replica() {
    let cluster = TestCluster::start(4).await;
    let chb = chb_owned_by_nodes_one_two_three(b"hello");

    cluster.nodes[0]
        .consensus(cluster.overlay.clone(), FACTOR)
        .insert(chb.clone())
        .await
        .unwrap();

    for node in &cluster.nodes {
        let fetched = node.consensus(cluster.overlay.clone(), FACTOR).fetch(chb.address()).await.unwrap();
        assert_eq!(fetched, chb);
    }
}

#[tokio::test]
async fn repeated_insert_of_the_same_content_is_not_a_collision() {
    let cluster = TestCluster::start(4).await;
    let chb = chb_owned_by_nodes_one_two_three(b"idempotent");
    let consensus = cluster.nodes[0].consensus(cluster.overlay.clone(), FACTOR);

    consensus.insert(chb.clone()).await.unwrap();
    consensus.insert(chb.clone()).await.unwrap();
}

#[tokio::test]
async fn insert_still_reaches_a_majority_with_one_of_three_owners_down() {
    let mut cluster = TestCluster::start(4).await;
    cluster.kill(3); // one of the three owners for our chosen address

    let chb = chb_owned_by_nodes_one_two_three(b"degraded-write");
    cluster.nodes[0]
        .consensus(cluster.overlay.clone(), FACTOR)
        .insert(chb.clone())
        .await
        .unwrap();

    let fetched = cluster.nodes[1]
        .consensus(cluster.overlay.clone(), FACTOR)
        .fetch(chb.address())
        .await
        .unwrap();
    assert_eq!(fetched, chb);
}

#[tokio::test]
async fn fetch_survives_two_of_three_owners_down() {
    let mut cluster = TestCluster::start(4).await;
    let chb = chb_owned_by_nodes_one_two_three(b"two-down-still-ok");
    cluster.nodes[0]
        .consensus(cluster.overlay.clone(), FACTOR)
        .insert(chb.clone())
        .await
        .unwrap();

    cluster.kill(3);
    cluster.kill(2);

    let fetched = cluster.nodes[0]
        .consensus(cluster.overlay.clone(), FACTOR)
        .fetch(chb.address())
        .await
        .unwrap();
    assert_eq!(fetched, chb);
}

/// A CHB whose address's owner-selection byte routes Stonehenge's
/// 5-peer cyclic ownership to start at node 0, i.e. owners `[0, 1, 2]`.
fn chb_owned_starting_at_node_zero(payload: &[u8]) -> Block {
    loop {
        let chb = Chb::new(payload.to_vec(), Address::NULL);
        if chb.address().as_bytes()[0] % 5 == 0 {
            return Block::Chb(chb);
        }
    }
}

#[tokio::test]
async fn insert_draws_a_fresh_replica_after_a_non_collision_refusal() {
    // Nodes 1 and 2 are reachable but out of space, so two of the three
    // allocated owners (`[0, 1, 2]`) refuse every store with
    // `InsufficientSpace` (not a collision), leaving only node 0's ack —
    // one short of `majority(3) == 2`. Without drawing a fourth,
    // not-yet-tried replica (node 3) to make up the shortfall, this
    // insert can never reach majority and must fail; with the fix, it
    // succeeds once node 3 acks too.
    let cluster = TestCluster::start_with_silo_capacities(vec![None, Some(0), Some(0), None, None]).await;
    let chb = chb_owned_starting_at_node_zero(b"needs-a-fresh-replica");

    cluster.nodes[0]
        .consensus(cluster.overlay.clone(), FACTOR)
        .insert(chb.clone())
        .await
        .unwrap();

    let fetched = cluster.nodes[0]
        .consensus(cluster.overlay.clone(), FACTOR)
        .fetch(chb.address())
        .await
        .unwrap();
    assert_eq!(fetched, chb);
}

#[tokio::test]
async fn fetch_fails_rather_than_returning_stale_data_once_every_owner_is_down() {
    let mut cluster = TestCluster::start(4).await;
    let chb = chb_owned_by_nodes_one_two_three(b"all-owners-down");
    cluster.nodes[0]
        .consensus(cluster.overlay.clone(), FACTOR)
        .insert(chb.clone())
        .await
        .unwrap();

    cluster.kill(3);
    cluster.kill(2);
    cluster.kill(1);

    // Node 0 was never an owner of this address, so it holds no local
    // copy either: with every owner gone the call must fail, not
    // fabricate an answer.
    let consensus = cluster.nodes[0].consensus(cluster.overlay.clone(), FACTOR);
    let result = tokio::time::timeout(Duration::from_secs(10), consensus.fetch(chb.address())).await;
    match result {
        Ok(Err(ConsensusError::MissingBlock(_))) => {}
        Ok(Ok(block)) => panic!("no owner was reachable; got a stale/fabricated answer: {block:?}"),
        Ok(Err(other)) => panic!("unexpected error: {other}"),
        Err(_) => panic!("fetch should fail fast against unreachable peers, not hang"),
    }
}
