//! Composable key-value backends a node's local storage is built from:
//! two concrete backends (`Memory`, `Filesystem`) and a set of wrapper
//! silos (`Cache`, `Crypt`, `Strip`, `Mirror`, `Async`, `Latency`) that
//! all implement the same [`Silo`] trait, so they nest freely.

pub mod async_silo;
pub mod cache;
pub mod crypt;
pub mod errors;
pub mod filesystem;
pub mod journal_lock;
pub mod latency;
pub mod memory;
pub mod mirror;
pub mod strip;
pub mod traits;
pub mod usage;

pub use async_silo::Async;
pub use cache::Cache;
pub use crypt::Crypt;
pub use errors::SiloError;
pub use filesystem::Filesystem;
pub use journal_lock::JournalLock;
pub use latency::Latency;
pub use memory::Memory;
pub use mirror::Mirror;
pub use strip::Strip;
pub use traits::{upsert, KeyStatus, Silo};
pub use usage::UsageTracker;
