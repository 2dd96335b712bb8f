//! Capture staging ring.
//!
//! A fixed-capacity circular store sitting between a synchronous capture
//! producer (webcam/microphone callback thread) and the async send pump.
//! When the consumer falls behind, the oldest staged frame is evicted: for
//! real-time media a stale frame is worse than a dropped one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Mutex-guarded fixed-capacity circular frame store.
///
/// FIFO for the frames that survive; eviction removes from the head only, so
/// order is never shuffled.
pub struct FrameRing<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    overflows: AtomicU64,
}

impl<T> FrameRing<T> {
    /// Create a ring holding at most `capacity` frames.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            overflows: AtomicU64::new(0),
        }
    }

    /// Stage a frame. Returns the evicted oldest frame if the ring was full.
    pub fn push(&self, item: T) -> Option<T> {
        let mut inner = self.inner.lock();
        let evicted = if inner.len() == self.capacity {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            inner.pop_front()
        } else {
            None
        };
        inner.push_back(item);
        evicted
    }

    /// Take the oldest staged frame.
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Drain everything currently staged.
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().drain(..).collect()
    }

    /// Number of staged frames.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many frames have been evicted because the consumer fell behind.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}
