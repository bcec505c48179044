// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded outbound queue.
//!
//! Events wait here until the delivery task takes them in batches. When the
//! queue is full, the oldest tenth of it (at least one event) is dropped
//! before the new event is appended: recent diagnostics are worth more than
//! old ones.

use std::collections::VecDeque;

use tracing::warn;

use crate::event::Event;

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    events: VecDeque<Event>,
    max_size: usize,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        OutboundQueue {
            events: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Applies a new bound. Already queued events above the bound stay until
    /// the next push makes room.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
    }

    /// Appends an event, evicting the oldest ones first when full.
    ///
    /// Returns how many events were evicted.
    pub fn push(&mut self, event: Event) -> usize {
        let mut evicted = 0;
        if self.events.len() >= self.max_size {
            let to_evict = (self.max_size / 10).max(1);
            // the bound may have shrunk since these were queued
            let excess = self.events.len() + 1 - self.max_size;
            evicted = to_evict.max(excess).min(self.events.len());
            self.events.drain(..evicted);
            warn!(
                "Outbound queue full ({} events), dropped {} oldest",
                self.max_size, evicted
            );
        }
        self.events.push_back(event);
        evicted
    }

    /// Removes up to `max` events from the front, in queue order.
    pub fn take_batch(&mut self, max: usize) -> Vec<Event> {
        let count = max.min(self.events.len());
        self.events.drain(..count).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;
    use serde_json::json;

    fn event(n: usize) -> Event {
        Event::structured_log(Severity::Info, vec![json!(n)], None, "o")
    }

    fn payloads(queue: &OutboundQueue) -> Vec<usize> {
        queue
            .iter()
            .map(|e| usize::try_from(e.payload[0].as_u64().unwrap_or_default()).unwrap_or(0))
            .collect()
    }

    #[test]
    fn test_fill_then_one_more_evicts_exactly_one() {
        let mut queue = OutboundQueue::new(10);
        for n in 1..=10 {
            assert_eq!(queue.push(event(n)), 0);
        }
        assert_eq!(queue.push(event(11)), 1);
        assert_eq!(queue.len(), 10);
        assert_eq!(payloads(&queue), (2..=11).collect::<Vec<_>>());
    }

    #[test]
    fn test_fifteen_into_ten_stays_bounded() {
        let mut queue = OutboundQueue::new(10);
        for n in 1..=15 {
            queue.push(event(n));
        }
        assert!(queue.len() <= 10);
        assert_eq!(payloads(&queue).last(), Some(&15));
        assert_eq!(payloads(&queue).first(), Some(&6));
    }

    #[test]
    fn test_evicts_a_tenth() {
        let mut queue = OutboundQueue::new(100);
        for n in 0..100 {
            queue.push(event(n));
        }
        assert_eq!(queue.push(event(100)), 10);
        assert_eq!(queue.len(), 91);
        assert_eq!(payloads(&queue).first(), Some(&10));
    }

    #[test]
    fn test_take_batch_is_fifo() {
        let mut queue = OutboundQueue::new(10);
        for n in 1..=7 {
            queue.push(event(n));
        }
        let batch = queue.take_batch(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].payload[0], json!(1));
        assert_eq!(batch[2].payload[0], json!(3));
        assert_eq!(queue.len(), 4);

        assert_eq!(queue.take_batch(10).len(), 4);
        assert!(queue.take_batch(10).is_empty());
    }

    #[test]
    fn test_shrinking_bound() {
        let mut queue = OutboundQueue::new(20);
        for n in 0..20 {
            queue.push(event(n));
        }
        queue.set_max_size(10);
        queue.push(event(20));
        assert_eq!(queue.len(), 10);
        assert_eq!(payloads(&queue).last(), Some(&20));
    }
}
