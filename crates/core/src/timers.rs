//! A deterministic timer queue driven by the frame clock.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

#[derive(Debug)]
struct Entry<E> {
    due: Duration,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Events fire in due-time order; ties fire in scheduling order.
#[derive(Debug)]
pub struct TimerQueue<E> {
    now: Duration,
    seq: u64,
    heap: BinaryHeap<Reverse<Entry<E>>>,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            seq: 0,
            heap: BinaryHeap::new(),
        }
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn schedule(&mut self, delay: Duration, event: E) {
        self.schedule_at(self.now + delay, event);
    }

    pub fn schedule_at(&mut self, due: Duration, event: E) {
        self.seq += 1;
        self.heap.push(Reverse(Entry {
            due,
            seq: self.seq,
            event,
        }));
    }

    pub fn advance(&mut self, dt: Duration) {
        self.now += dt;
    }

    /// Next event whose due time has passed. Events scheduled while draining
    /// are picked up too if they are already due.
    pub fn pop_due(&mut self) -> Option<E> {
        if self.heap.peek()?.0.due > self.now {
            return None;
        }
        self.heap.pop().map(|Reverse(entry)| entry.event)
    }
}
