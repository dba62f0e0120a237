//! A bounded FIFO that evicts its oldest entry instead of growing.

use std::collections::VecDeque;

use tracing::debug;

/// FIFO with a fixed capacity.
///
/// Pushing into a full queue drops the oldest entry and counts it. Overflow
/// is never an error: the caller sees the eviction only through
/// [`BoundedQueue::evicted`].
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    queue: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> BoundedQueue<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            evicted: 0,
        }
    }

    /// Appends `item`, returning the entry evicted to make room, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let dropped = if self.queue.len() >= self.capacity {
            self.evicted += 1;
            self.queue.pop_front()
        } else {
            None
        };
        if dropped.is_some() {
            debug!(
                "BoundedQueue: full at {}, evicted oldest (total {})",
                self.capacity, self.evicted
            );
        }
        self.queue.push_back(item);
        dropped
    }

    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    pub fn front(&self) -> Option<&T> {
        self.queue.front()
    }

    /// Drops entries from the front while `predicate` holds. Returns how many.
    pub fn evict_while(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let mut count = 0;
        while let Some(front) = self.queue.front() {
            if !predicate(front) {
                break;
            }
            self.queue.pop_front();
            count += 1;
        }
        self.evicted += count as u64;
        count
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries dropped for capacity or age since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
