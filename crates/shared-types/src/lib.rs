//! # Shared Types
//!
//! `Address`, `Passport`, and the small value aliases (`Hash`, `PublicKey`,
//! `Signature`, `NodeId`, ...) shared by every other crate in the
//! workspace. Kept free of crypto-backend and async-runtime dependencies
//! so it can sit at the bottom of the dependency graph.

pub mod address;
pub mod common;
pub mod passport;

pub use address::{equal_unflagged, Address, FLAG_BYTE};
pub use common::{Hash, NodeId, PublicKey, Signature, Timestamp, Version};
pub use passport::{Capabilities, Passport};
