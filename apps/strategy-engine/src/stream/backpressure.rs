//! Bounded FIFO buffer with drop-oldest overflow.
//!
//! Used where a slow consumer must never stall the stream: when the
//! queue is full the oldest element is discarded to make room, and a
//! counter records how many were lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Fixed-capacity queue that sheds the oldest element on overflow.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an element, evicting the oldest if the queue is full.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        if items.len() == self.capacity {
            items.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        items.push_back(item);
    }

    /// Pop the oldest element.
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Drain every queued element in FIFO order.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    /// Current number of queued elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Total elements dropped to overflow since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
