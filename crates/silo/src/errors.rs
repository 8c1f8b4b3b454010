//! Silo errors.

use shared_types::Address;
use thiserror::Error;

/// Errors a silo backend or wrapper can raise.
#[derive(Debug, Error)]
pub enum SiloError {
    /// `get`/`erase`/update-only `set` against an address with nothing
    /// stored there.
    #[error("no value stored at {0}")]
    MissingKey(Address),

    /// Insert-only `set` against an address that already has a value.
    #[error("value already stored at {0}")]
    Collision(Address),

    /// The backend refused the write: it has no room for it.
    #[error("insufficient space: {requested} bytes requested, {available} available")]
    InsufficientSpace {
        /// Bytes the write would have consumed.
        requested: u64,
        /// Bytes currently available, if known.
        available: u64,
    },

    /// The backend's storage medium failed (disk I/O, lock contention).
    #[error("backend I/O error: {0}")]
    Backend(String),

    /// A wrapper's own bookkeeping hit an inconsistency (e.g. journal
    /// corruption, strip backend out of range).
    #[error("silo wrapper error: {0}")]
    Wrapper(String),
}

impl SiloError {
    /// Shorthand used by backends wrapping a `std::io::Error`.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        SiloError::Backend(err.to_string())
    }
}
