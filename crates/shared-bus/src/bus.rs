//! The in-process lifecycle event bus.
//!
//! A thin wrapper over `tokio::sync::broadcast`: every subscriber gets its
//! own receiver and sees every event published after it subscribed. Slow
//! subscribers that fall more than `capacity` events behind are
//! disconnected with a `Lagged` error on their next `recv`, per
//! `broadcast`'s normal semantics — callers that can't tolerate missed
//! events (the disk-overflow cache) should resubscribe and treat a lag as
//! "invalidate everything" rather than trying to replay.

use tokio::sync::broadcast;

use crate::events::LifecycleEvent;

/// Default number of in-flight events buffered per subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Publishes and distributes [`LifecycleEvent`]s to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with an explicit per-subscriber channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to every current subscriber. A no-op (not an
    /// error) if there are no subscribers.
    pub fn publish(&self, event: LifecycleEvent) {
        // `send` only errors when there are zero receivers; that is an
        // expected, harmless state for this bus (e.g. before the first
        // cache layer has subscribed).
        let _ = self.sender.send(event);
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of currently active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to an [`EventBus`].
pub struct EventSubscription {
    receiver: broadcast::Receiver<LifecycleEvent>,
}

/// Why a `recv` call on an [`EventSubscription`] failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    /// The publishing side has been dropped; no further events will arrive.
    #[error("event bus closed")]
    Closed,
    /// The subscriber fell behind and skipped `skipped` events.
    #[error("subscriber lagged, skipped {skipped} events")]
    Lagged {
        /// Number of events that were dropped before this one.
        skipped: u64,
    },
}

impl EventSubscription {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Result<LifecycleEvent, RecvError> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Closed) => Err(RecvError::Closed),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                Err(RecvError::Lagged { skipped })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Address;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        let addr = Address::random(true);
        bus.publish(LifecycleEvent::Stored {
            address: addr,
            version: Some(1),
        });

        let event = sub.recv().await.unwrap();
        assert_eq!(event.address(), Some(addr));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(LifecycleEvent::Removed {
            address: Address::random(false),
        });
    }

    #[tokio::test]
    async fn lagging_subscriber_reports_skipped_count() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.publish(LifecycleEvent::Fetched {
                address: Address::random(true),
            });
        }

        let err = sub.recv().await.unwrap_err();
        assert!(matches!(err, RecvError::Lagged { .. }));
    }

    #[tokio::test]
    async fn subscriber_count_reflects_live_subscriptions() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
