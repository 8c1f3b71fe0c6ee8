//! Bounded ingress queue with drop-oldest backpressure
//!
//! One queue per relay direction. Bus delivery threads push, the relay
//! worker drains. Under sustained overload stale samples are evicted rather
//! than blocking producers or growing without bound.

use crate::error::{RelayError, RelayResult};
use crate::tf::TransformSample;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default queue capacity (samples)
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Bounded FIFO of received samples awaiting relay
#[derive(Debug)]
pub struct IngressQueue {
    entries: Mutex<VecDeque<TransformSample>>,
    capacity: usize,
    pushed: AtomicU64,
    evicted: AtomicU64,
}

impl IngressQueue {
    /// Create a queue holding at most `capacity` samples
    pub fn new(capacity: usize) -> RelayResult<Self> {
        if capacity == 0 {
            return Err(RelayError::config("ingress queue capacity must be at least 1"));
        }
        Ok(Self {
            // Grows on demand, the bound is enforced in push()
            entries: Mutex::new(VecDeque::new()),
            capacity,
            pushed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        })
    }

    /// Enqueue a sample, evicting the oldest one if the queue is full
    pub fn push(&self, sample: TransformSample) {
        let evicted = {
            let mut entries = self.entries.lock();
            let evicted = if entries.len() >= self.capacity {
                entries.pop_front().is_some()
            } else {
                false
            };
            entries.push_back(sample);
            evicted
        };

        self.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted {
            let total = self.evicted.fetch_add(1, Ordering::Relaxed) + 1;
            // First eviction, then every 1000th
            if total == 1 || total % 1000 == 0 {
                log::debug!(
                    "Ingress queue full ({} samples), {} evicted so far",
                    self.capacity,
                    total
                );
            }
        }
    }

    /// Remove and return every queued sample in arrival order
    pub fn drain_all(&self) -> Vec<TransformSample> {
        let drained = std::mem::take(&mut *self.entries.lock());
        Vec::from(drained)
    }

    /// Drop everything still queued, returning how many samples were discarded
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total samples ever pushed
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Total samples evicted by the capacity bound
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for IngressQueue {
    fn default() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: DEFAULT_QUEUE_CAPACITY,
            pushed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }
}
