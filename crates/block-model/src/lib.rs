//! # Block Model
//!
//! The six block variants (CHB, OKB, ACB, NB, UB, GB), their sealing and
//! validation rules, the ACL they can embed, `RemoveSignature`, and the
//! wire codec that serializes any of them.

pub mod acb;
pub mod acl;
pub mod block;
pub mod chb;
pub mod errors;
pub mod gb;
pub mod nb;
pub mod okb;
pub mod remove_signature;
pub mod ub;
pub mod wire;

pub use acb::Acb;
pub use acl::{Acl, AclEntry};
pub use block::Block;
pub use chb::Chb;
pub use errors::BlockError;
pub use gb::Gb;
pub use nb::Nb;
pub use okb::Okb;
pub use remove_signature::RemoveSignature;
pub use ub::{Direction, Ub};
