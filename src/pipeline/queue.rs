//! Bounded drop-oldest queue shared between one producer and one consumer

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use tracing::trace;

/// Fixed-capacity FIFO whose producer never blocks.
///
/// When full, `push` evicts the oldest element before admitting the new one.
/// Pops never block except [`BoundedDropQueue::blocking_pop`], which waits
/// at most the given timeout.
pub struct BoundedDropQueue<T> {
    name: &'static str,
    ring: Mutex<HeapRb<T>>,
    available: Condvar,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    pushed: AtomicU64,
    popped: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of a queue's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounters {
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
}

impl<T> BoundedDropQueue<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        assert!(capacity > 0, "queue `{name}` needs a capacity of at least 1");
        Self {
            name,
            ring: Mutex::new(HeapRb::new(capacity)),
            available: Condvar::new(),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: append `item`, evicting the oldest element if full.
    ///
    /// Returns `true` when an element was evicted.
    pub fn push(&self, item: T) -> bool {
        let evicted = self.ring.lock().push_overwrite(item);
        self.available.notify_one();

        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("gesture_queue_pushed_total", "queue" => self.name).increment(1);

        let dropped = evicted.is_some();
        if dropped {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("gesture_queue_dropped_total", "queue" => self.name).increment(1);
            trace!(queue = self.name, "queue full, dropped oldest item");
        }
        dropped
    }

    /// Consumer: take the oldest element without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.ring.lock().try_pop();
        self.record_pop(item)
    }

    /// Consumer: take the oldest element, waiting up to `timeout` for one.
    ///
    /// Returns `None` when the timeout elapses with the queue still empty.
    pub fn blocking_pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut ring = self.ring.lock();
        loop {
            if let Some(item) = ring.try_pop() {
                drop(ring);
                return self.record_pop(Some(item));
            }
            if self.available.wait_until(&mut ring, deadline).timed_out() {
                let item = ring.try_pop();
                drop(ring);
                return self.record_pop(item);
            }
        }
    }

    fn record_pop(&self, item: Option<T>) -> Option<T> {
        if item.is_some() {
            self.stats.popped.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    pub fn len(&self) -> usize {
        self.ring.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity().get()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn counters(&self) -> QueueCounters {
        QueueCounters {
            pushed: self.stats.pushed.load(Ordering::Relaxed),
            popped: self.stats.popped.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}
