//! Multi-node scenarios from spec §8 that no single crate's unit tests
//! can exercise alone: real TCP docks, a shared overlay, and a
//! [`DistributedConsensus`](consensus::DistributedConsensus) client per
//! node, driven together through a small [`cluster::TestCluster`]
//! harness.
//!
//! - `cluster` — the harness: spins up `count` real nodes over loopback
//!   TCP, each with its own `Dock`/`Memory` silo, sharing one
//!   `Stonehenge` overlay and one network owner's passports.
//! - `chb_replication` — CHB insert/fetch/remove replication-tolerance
//!   scenarios (§8: replication tolerates node loss, fetch of a removed
//!   block raises `MissingBlock`).
//! - `mutable_consensus` — OKB/ACB versioning under concurrent writers,
//!   quorum-down-and-rebalance, ACL revoke (§8 concrete scenarios).

pub mod chb_replication;
pub mod cluster;
pub mod mutable_consensus;
