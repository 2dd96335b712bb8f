//! Shared buffer pool.
//!
//! Encoding a packet acquires a buffer; dropping the [`PooledBuf`] returns it
//! to the free list. Exhaustion degrades to a plain allocation (counted as a
//! miss) instead of blocking the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A bounded pool of reusable byte buffers.
///
/// Shared across all connections in a process. Acquire/release are safe to
/// call concurrently; the free-list lock is only held for the push/pop.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_buffers: usize,
    buf_capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquires served from the free list.
    pub hits: u64,
    /// Acquires that fell back to a fresh allocation.
    pub misses: u64,
    /// Buffers currently sitting in the free list.
    pub free: usize,
}

impl BufferPool {
    /// Create a pool holding up to `max_buffers` buffers of `buf_capacity`
    /// bytes each. All buffers are allocated up front.
    pub fn new(max_buffers: usize, buf_capacity: usize) -> Arc<Self> {
        let free = (0..max_buffers)
            .map(|_| Vec::with_capacity(buf_capacity))
            .collect();
        Arc::new(Self {
            free: Mutex::new(free),
            max_buffers,
            buf_capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Pool with the crate default sizing.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(
            crate::core::BUFFER_POOL_SIZE,
            crate::core::BUFFER_POOL_BUF_CAPACITY,
        )
    }

    /// Acquire an empty buffer.
    ///
    /// When the free list is empty a fresh buffer is allocated so callers
    /// never wait on the pool.
    pub fn acquire(self: &Arc<Self>) -> PooledBuf {
        let recycled = self.free.lock().pop();
        let buf = match recycled {
            Some(buf) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.buf_capacity)
            }
        };
        PooledBuf {
            buf,
            pool: Some(Arc::clone(self)),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            free: self.free.lock().len(),
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock();
        // Keep the pool bounded; oversized or surplus buffers are just freed.
        if free.len() < self.max_buffers && buf.capacity() >= self.buf_capacity {
            free.push(buf);
        }
    }
}

/// An owned buffer checked out of a [`BufferPool`].
///
/// Exactly one logical owner holds the buffer at a time; dropping the handle
/// moves it back to the pool.
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Option<Arc<BufferPool>>,
}

impl PooledBuf {
    /// Wrap a standalone buffer that returns nowhere on drop. Useful in tests
    /// and for callers without a pool.
    pub fn unpooled(buf: Vec<u8>) -> Self {
        Self { buf, pool: None }
    }

    /// Detach the inner buffer from the pool. It will not be recycled.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.pool = None;
        std::mem::take(&mut self.buf)
    }
}

impl std::ops::Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.buf.len())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.buf));
        }
    }
}
