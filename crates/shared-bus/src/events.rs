//! Lifecycle events published by the model facade and the silo layer.

use shared_types::{Address, NodeId};

/// An event describing something that happened to a block or a silo.
///
/// The `Cache` consensus and silo wrappers subscribe to these to
/// invalidate entries; the overlay subscribes to `CapacityChanged` to
/// advertise updated free space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A block was durably written (insert or update) at `address`.
    Stored {
        /// Address the block was written at.
        address: Address,
        /// Version after the write, for mutable blocks; `None` for
        /// immutable variants.
        version: Option<u64>,
    },
    /// A block was successfully fetched at `address`.
    Fetched {
        /// Address that was read.
        address: Address,
    },
    /// A block was removed at `address`.
    Removed {
        /// Address that was removed.
        address: Address,
    },
    /// A silo's usage crossed a reporting threshold (~10% of capacity).
    CapacityChanged {
        /// The silo or node this usage figure belongs to.
        owner: NodeId,
        /// Bytes currently in use.
        usage_bytes: u64,
        /// Configured capacity, if any.
        capacity_bytes: Option<u64>,
    },
}

impl LifecycleEvent {
    /// The address this event concerns, if any (`CapacityChanged` has
    /// none — it is keyed by node, not by address).
    pub fn address(&self) -> Option<Address> {
        match self {
            LifecycleEvent::Stored { address, .. }
            | LifecycleEvent::Fetched { address }
            | LifecycleEvent::Removed { address } => Some(*address),
            LifecycleEvent::CapacityChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_changed_has_no_address() {
        let event = LifecycleEvent::CapacityChanged {
            owner: NodeId([0u8; 32]),
            usage_bytes: 100,
            capacity_bytes: Some(1000),
        };
        assert_eq!(event.address(), None);
    }

    #[test]
    fn stored_carries_its_address() {
        let addr = Address::random(true);
        let event = LifecycleEvent::Stored {
            address: addr,
            version: Some(1),
        };
        assert_eq!(event.address(), Some(addr));
    }
}
