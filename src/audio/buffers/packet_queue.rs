//! Arrival-ordered packet queue of the decode path.
//!
//! Packets are kept in the order they arrived, tagged with their arrival
//! time and a monotonic input counter. The queue is bounded both by count
//! and by the age of its oldest entry.

use tracing::debug;

use super::BoundedQueue;

/// One received payload waiting for decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPacket {
    pub payload: Vec<u8>,
    pub arrival_ms: u64,
    /// Input order, not the RTP sequence number.
    pub tag: u64,
}

#[derive(Debug, Clone)]
pub struct PacketQueue {
    queue: BoundedQueue<IncomingPacket>,
    max_age_ms: u64,
    next_tag: u64,
}

impl PacketQueue {
    pub fn new(capacity: usize, max_age_ms: u64) -> Self {
        Self {
            queue: BoundedQueue::new(capacity),
            max_age_ms,
            next_tag: 0,
        }
    }

    /// Queues `payload` and evicts whatever is past the count or age ceiling.
    pub fn push(&mut self, payload: Vec<u8>, now_ms: u64) {
        let tag = self.next_tag;
        self.next_tag += 1;

        self.evict_expired(now_ms);
        if let Some(dropped) = self.queue.push(IncomingPacket {
            payload,
            arrival_ms: now_ms,
            tag,
        }) {
            debug!(
                "PacketQueue: capacity {} reached, dropped packet #{}",
                self.queue.capacity(),
                dropped.tag
            );
        }
    }

    /// Drops packets that arrived more than `max_age_ms` before `now_ms`.
    pub fn evict_expired(&mut self, now_ms: u64) -> usize {
        let max_age = self.max_age_ms;
        let dropped = self
            .queue
            .evict_while(|p| now_ms.saturating_sub(p.arrival_ms) > max_age);
        if dropped > 0 {
            debug!(
                "PacketQueue: dropped {} packets older than {}ms",
                dropped, max_age
            );
        }
        dropped
    }

    pub fn pop(&mut self) -> Option<IncomingPacket> {
        self.queue.pop()
    }

    /// Milliseconds the oldest queued packet has waited.
    pub fn oldest_age_ms(&self, now_ms: u64) -> Option<u64> {
        self.queue
            .front()
            .map(|p| now_ms.saturating_sub(p.arrival_ms))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn evicted(&self) -> u64 {
        self.queue.evicted()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_ceiling() {
        let mut queue = PacketQueue::new(5, 3000);
        for i in 0..8u8 {
            queue.push(vec![i], 0);
            assert!(queue.len() <= 5);
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.evicted(), 3);
        let oldest = queue.pop().unwrap();
        assert_eq!(oldest.payload, vec![3]);
        assert_eq!(oldest.tag, 3);
    }

    #[test]
    fn test_age_ceiling() {
        let mut queue = PacketQueue::new(250, 3000);
        queue.push(vec![1], 0);
        queue.push(vec![2], 1000);
        queue.push(vec![3], 3500);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.oldest_age_ms(3500), Some(2500));
        assert_eq!(queue.pop().unwrap().payload, vec![2]);
    }

    #[test]
    fn test_tags_are_monotonic() {
        let mut queue = PacketQueue::new(10, 3000);
        queue.push(vec![], 5);
        queue.push(vec![], 5);
        assert_eq!(queue.pop().unwrap().tag, 0);
        assert_eq!(queue.pop().unwrap().tag, 1);
    }
}
