//! # Consensus
//!
//! Paxos-per-address consensus over the block model: immutable blocks
//! (CHB/NB/UB) replicate to a majority of owners; mutable blocks
//! (OKB/ACB/GB) run Multi-Paxos per address, including quorum
//! reconfiguration. [`DistributedConsensus`] is the concrete backend;
//! [`cache::Cache`] and [`async_consensus::Async`] stack on top of any
//! [`Consensus`] implementation, including each other.

pub mod async_consensus;
pub mod cache;
pub mod distributed;
pub mod errors;
pub mod handler;
pub mod immutable;
pub mod mutable;
pub mod paxos;
pub mod quorum;
pub mod resolver;
pub mod rpc;
pub mod traits;

pub use async_consensus::Async;
pub use cache::Cache;
pub use distributed::{DistributedConsensus, DEFAULT_CALL_TIMEOUT};
pub use errors::ConsensusError;
pub use handler::ConsensusHandler;
pub use paxos::{AcceptorRecord, AcceptorTable, Ballot, PaxosValue};
pub use quorum::Quorum;
pub use resolver::{AbstainResolver, AcbDeltaResolver, ConflictResolver};
pub use traits::Consensus;
