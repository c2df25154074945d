//! The propagation scheduler's event queue.
//!
//! Events are processed in ascending scheduled-time order, FIFO within
//! equal times (an insertion sequence number breaks ties). Stability is an
//! empty queue. The step limit bounds runaway circuits (ring oscillators)
//! so a non-converging `run` fails instead of spinning.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::circuit::graph::ElementKey;

/// Default bound on scheduler steps per `run`.
pub const STEP_LIMIT: u64 = 1_000_000;

/// One scheduled resolve. Ordering is (time, seq): `derive(Ord)` relies on
/// the field order here.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Event {
    time: u64,
    seq: u64,
    element: ElementKey,
}

/// A time-ordered queue of pending element resolutions.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
    seq: u64,
}

impl EventQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether no events are pending (the stability condition).
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Schedules `element` at `time`.
    pub fn push(&mut self, time: u64, element: ElementKey) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(Event { time, seq, element }));
    }

    /// Pops the earliest event; insertion order breaks time ties.
    pub fn pop(&mut self) -> Option<(u64, ElementKey)> {
        self.heap.pop().map(|Reverse(e)| (e.time, e.element))
    }

    /// Drops all pending events.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn keys(n: usize) -> Vec<ElementKey> {
        let mut map: SlotMap<ElementKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_pops_in_time_order() {
        let ks = keys(3);
        let mut q = EventQueue::new();
        q.push(30, ks[0]);
        q.push(10, ks[1]);
        q.push(20, ks[2]);

        assert_eq!(q.pop(), Some((10, ks[1])));
        assert_eq!(q.pop(), Some((20, ks[2])));
        assert_eq!(q.pop(), Some((30, ks[0])));
        assert!(q.is_empty());
    }

    #[test]
    fn test_fifo_within_equal_times() {
        let ks = keys(3);
        let mut q = EventQueue::new();
        q.push(5, ks[2]);
        q.push(5, ks[0]);
        q.push(5, ks[1]);

        let order: Vec<_> = std::iter::from_fn(|| q.pop()).map(|(_, k)| k).collect();
        assert_eq!(
            order,
            vec![ks[2], ks[0], ks[1]],
            "Events at the same time should pop in insertion order"
        );
    }
}
