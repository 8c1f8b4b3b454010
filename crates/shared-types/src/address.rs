//! # Address
//!
//! A 32-byte block identifier. The last byte is the flag byte: bit 0
//! distinguishes mutable (0) from immutable (1) blocks. Ordering is the
//! lexicographic order of the 32 bytes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Bit values of the flag byte (last byte of an [`Address`]).
pub mod flags {
    /// The address identifies a mutable block (OKB, ACB, GB).
    pub const MUTABLE_BLOCK: u8 = 0;
    /// The address identifies an immutable block (CHB, NB, UB).
    pub const IMMUTABLE_BLOCK: u8 = 1;
}

/// Index of the flag byte within the 32-byte value.
pub const FLAG_BYTE: usize = 31;

/// A 32-byte, content- or key-derived block identifier.
#[derive(Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    /// The null address: all zeros, used as a sentinel "unset owner".
    pub const NULL: Address = Address([0u8; 32]);

    /// Build an address from a 32-byte digest and an explicit mutability flag.
    pub fn new(mut value: [u8; 32], mutable: bool) -> Self {
        value[FLAG_BYTE] = if mutable {
            flags::MUTABLE_BLOCK
        } else {
            flags::IMMUTABLE_BLOCK
        };
        Address(value)
    }

    /// Build an address from raw bytes, taking the flag byte as-is.
    pub fn from_raw(value: [u8; 32]) -> Self {
        Address(value)
    }

    /// The underlying 32 bytes, flag byte included.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the null (unset) address.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Whether the address identifies a mutable block.
    pub fn is_mutable(&self) -> bool {
        self.0[FLAG_BYTE] == flags::MUTABLE_BLOCK
    }

    /// Whether the address identifies an immutable block.
    pub fn is_immutable(&self) -> bool {
        !self.is_mutable()
    }

    /// A random address with the requested mutability, for tests.
    pub fn random(mutable: bool) -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self::new(bytes, mutable)
    }

    /// Lower-case hex representation, used for on-disk silo paths.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse an address from its hex representation.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let mut value = [0u8; 32];
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        value.copy_from_slice(&bytes);
        Ok(Address(value))
    }
}

/// Compare two addresses ignoring the flag byte.
///
/// Legacy-compat helper: not used by any invariant-bearing code path.
pub fn equal_unflagged(lhs: &Address, rhs: &Address) -> bool {
    lhs.0[..FLAG_BYTE] == rhs.0[..FLAG_BYTE]
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::hash::Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}..)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_address_has_no_bits_set() {
        assert!(Address::NULL.is_null());
    }

    #[test]
    fn flag_byte_distinguishes_mutability() {
        let mutable = Address::new([7u8; 32], true);
        let immutable = Address::new([7u8; 32], false);
        assert!(mutable.is_mutable());
        assert!(immutable.is_immutable());
        assert_ne!(mutable, immutable);
        assert!(equal_unflagged(&mutable, &immutable));
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = Address::from_raw([1u8; 32]);
        let b = Address::from_raw([2u8; 32]);
        assert!(a < b);
    }

    #[test]
    fn hex_roundtrip() {
        let addr = Address::random(true);
        let hex = addr.to_hex();
        let parsed = Address::from_hex(&hex).unwrap();
        assert_eq!(addr, parsed);
    }
}
