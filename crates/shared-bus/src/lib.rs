//! The lifecycle event bus: `on_store` / `on_fetch` / `on_remove` and
//! silo capacity-change notifications, consumed by the cache layers in
//! `silo` and `consensus`, and by the overlay's free-space advertising.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bus;
pub mod events;

pub use bus::{EventBus, EventSubscription, RecvError, DEFAULT_CHANNEL_CAPACITY};
pub use events::LifecycleEvent;
