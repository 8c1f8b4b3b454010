//! Shared usage/block-count bookkeeping, plus the ~10%-step capacity
//! notifier every backend wires up.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use shared_bus::{EventBus, LifecycleEvent};
use shared_types::NodeId;
use telemetry::metrics::{SILO_BLOCK_COUNT, SILO_USAGE_BYTES};

/// Tracks `usage`/`block_count` for a silo backend and publishes a
/// [`LifecycleEvent::CapacityChanged`] each time usage crosses a new
/// ~10%-of-capacity bucket, so the overlay can re-advertise free space
/// without being told on every single write.
pub struct UsageTracker {
    name: &'static str,
    owner: NodeId,
    usage: AtomicU64,
    block_count: AtomicI64,
    capacity: Option<u64>,
    bus: Option<EventBus>,
    last_bucket: AtomicU64,
}

impl UsageTracker {
    pub fn new(name: &'static str, owner: NodeId, capacity: Option<u64>, bus: Option<EventBus>) -> Self {
        Self {
            name,
            owner,
            usage: AtomicU64::new(0),
            block_count: AtomicI64::new(0),
            capacity,
            bus,
            last_bucket: AtomicU64::new(0),
        }
    }

    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }

    pub fn block_count(&self) -> u64 {
        self.block_count.load(Ordering::Relaxed).max(0) as u64
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn remaining(&self) -> Option<u64> {
        self.capacity.map(|cap| cap.saturating_sub(self.usage()))
    }

    /// Record a new key landing (`old_len = None`) or an existing one
    /// changing size (`old_len = Some(previous)`). Returns the signed
    /// byte delta, matching the silo contract's `set` result.
    pub fn record_set(&self, old_len: Option<usize>, new_len: usize) -> i64 {
        let delta = match old_len {
            Some(old) => new_len as i64 - old as i64,
            None => {
                self.block_count.fetch_add(1, Ordering::Relaxed);
                new_len as i64
            }
        };
        self.apply_delta(delta);
        delta
    }

    /// Record a key's removal. Returns the (negative) byte delta.
    pub fn record_erase(&self, old_len: usize) -> i64 {
        self.block_count.fetch_sub(1, Ordering::Relaxed);
        let delta = -(old_len as i64);
        self.apply_delta(delta);
        delta
    }

    fn apply_delta(&self, delta: i64) {
        let new_usage = if delta >= 0 {
            self.usage.fetch_add(delta as u64, Ordering::Relaxed) + delta as u64
        } else {
            let magnitude = (-delta) as u64;
            self.usage.fetch_sub(magnitude, Ordering::Relaxed).saturating_sub(magnitude)
        };

        SILO_USAGE_BYTES.with_label_values(&[self.name]).set(new_usage as f64);
        SILO_BLOCK_COUNT
            .with_label_values(&[self.name])
            .set(self.block_count() as f64);

        self.maybe_notify(new_usage);
    }

    fn maybe_notify(&self, new_usage: u64) {
        let Some(capacity) = self.capacity else { return };
        if capacity == 0 {
            return;
        }
        let bucket = (new_usage.min(capacity) * 10) / capacity;
        let previous = self.last_bucket.swap(bucket, Ordering::Relaxed);
        if bucket == previous {
            return;
        }
        if let Some(bus) = &self.bus {
            bus.publish(LifecycleEvent::CapacityChanged {
                owner: self.owner,
                usage_bytes: new_usage,
                capacity_bytes: Some(capacity),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_set_tracks_byte_delta_and_block_count() {
        let tracker = UsageTracker::new("test", NodeId([0u8; 32]), None, None);
        assert_eq!(tracker.record_set(None, 10), 10);
        assert_eq!(tracker.usage(), 10);
        assert_eq!(tracker.block_count(), 1);

        assert_eq!(tracker.record_set(Some(10), 4), -6);
        assert_eq!(tracker.usage(), 4);
        assert_eq!(tracker.block_count(), 1);
    }

    #[test]
    fn record_erase_decrements_block_count_and_usage() {
        let tracker = UsageTracker::new("test", NodeId([0u8; 32]), None, None);
        tracker.record_set(None, 10);
        assert_eq!(tracker.record_erase(10), -10);
        assert_eq!(tracker.usage(), 0);
        assert_eq!(tracker.block_count(), 0);
    }

    #[tokio::test]
    async fn crossing_a_ten_percent_bucket_notifies_once() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let tracker = UsageTracker::new("test", NodeId([1u8; 32]), Some(100), Some(bus));

        tracker.record_set(None, 5); // bucket 0 -> 0, no notify
        tracker.record_set(Some(5), 15); // bucket 0 -> 1, notify

        let event = sub.recv().await.unwrap();
        assert!(matches!(event, LifecycleEvent::CapacityChanged { .. }));
    }
}
