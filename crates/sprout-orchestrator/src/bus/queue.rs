//! Bounded priority queue used for both bus queues.
//!
//! Items pop highest priority first, then earliest timestamp, then earliest
//! publish sequence. When full, the item at the opposite end is evicted:
//! the newest item of the lowest band.

use crate::types::Priority;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordering key of a queued item. Greater keys are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    priority: Priority,
    timestamp: Reverse<DateTime<Utc>>,
    sequence: Reverse<u64>,
}

impl QueueKey {
    /// Priority band of the item.
    pub const fn priority(&self) -> Priority {
        self.priority
    }
}

/// Outcome of a push.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// The item was queued and nothing was dropped.
    Queued,
    /// The queue was full and this item was dropped to make room.
    Evicted(T),
}

/// Capacity-bounded priority queue with FIFO order inside a band.
#[derive(Debug)]
pub struct BoundedPriorityQueue<T> {
    items: BTreeMap<QueueKey, T>,
    capacity: usize,
    sequence: Arc<AtomicU64>,
}

impl<T> BoundedPriorityQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: BTreeMap::new(),
            capacity: capacity.max(1),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates an empty queue that draws publish sequence numbers from the
    /// same counter as `other`, so keys of the two queues compare.
    #[must_use]
    pub fn sharing_sequence<U>(capacity: usize, other: &BoundedPriorityQueue<U>) -> Self {
        Self {
            items: BTreeMap::new(),
            capacity: capacity.max(1),
            sequence: Arc::clone(&other.sequence),
        }
    }

    /// Queues `item`. If that overflows the queue, the lowest-priority,
    /// most recently queued item is evicted, which may be `item` itself.
    pub fn push(&mut self, priority: Priority, timestamp: DateTime<Utc>, item: T) -> PushOutcome<T> {
        let key = QueueKey {
            priority,
            timestamp: Reverse(timestamp),
            sequence: Reverse(self.sequence.fetch_add(1, Ordering::Relaxed)),
        };
        self.items.insert(key, item);

        if self.items.len() > self.capacity
            && let Some((_, evicted)) = self.items.pop_first()
        {
            return PushOutcome::Evicted(evicted);
        }
        PushOutcome::Queued
    }

    /// Removes and returns the next item to dispatch.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_last().map(|(_, item)| item)
    }

    /// Key of the next item to dispatch.
    pub fn peek_key(&self) -> Option<QueueKey> {
        self.items.last_key_value().map(|(key, _)| *key)
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
