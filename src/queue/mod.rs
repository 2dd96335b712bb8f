//! Bounded async packet queues with selectable overflow behavior.
//!
//! Control traffic (capability, ping, goodbye) rides `Block` queues so
//! nothing is silently lost; media traffic rides `DropOldest` queues so a
//! slow consumer sees fresh frames instead of an ever-growing backlog.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::QueueError;

/// What `enqueue` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait until a slot frees up.
    Block,
    /// Evict the oldest item and accept the new one.
    DropOldest,
    /// Reject the new item with [`QueueError::Full`].
    RejectNewest,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
    dropped: u64,
}

/// A bounded FIFO queue shared between async tasks.
///
/// Closing the queue wakes all waiters. Items already enqueued remain
/// dequeueable after close; [`QueueError::Closed`] is only returned once the
/// queue is both closed and empty.
pub struct PacketQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> PacketQueue<T> {
    /// Create a queue with the given capacity and overflow policy.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0, "queue capacity must be nonzero");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                dropped: 0,
            }),
            capacity,
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Enqueue an item, applying the overflow policy when full.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(QueueError::Closed);
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item);
                    drop(inner);
                    self.not_empty.notify_one();
                    return Ok(());
                }
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        inner.items.pop_front();
                        inner.dropped += 1;
                        inner.items.push_back(item);
                        drop(inner);
                        self.not_empty.notify_one();
                        return Ok(());
                    }
                    OverflowPolicy::RejectNewest => return Err(QueueError::Full),
                    OverflowPolicy::Block => {}
                }
                // Register for a wakeup while still holding the lock: with
                // several waiters, a notify_one landing between unlock and
                // await would otherwise coalesce into one stored permit and
                // strand a waiter. The guard's scope ends before the await so
                // the future stays `Send`.
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Enqueue without waiting. On a full `Block` queue this behaves like
    /// `RejectNewest`.
    pub fn try_enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        if inner.items.len() < self.capacity {
            inner.items.push_back(item);
            drop(inner);
            self.not_empty.notify_one();
            return Ok(());
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                inner.items.pop_front();
                inner.dropped += 1;
                inner.items.push_back(item);
                drop(inner);
                self.not_empty.notify_one();
                Ok(())
            }
            _ => Err(QueueError::Full),
        }
    }

    /// Dequeue the oldest item, waiting while the queue is empty and open.
    pub async fn dequeue(&self) -> Result<T, QueueError> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.not_full.notify_one();
                    return Ok(item);
                }
                if inner.closed {
                    return Err(QueueError::Closed);
                }
                // Same registration discipline as enqueue
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Dequeue without waiting.
    pub fn try_dequeue(&self) -> Result<T, QueueError> {
        let mut inner = self.inner.lock();
        if let Some(item) = inner.items.pop_front() {
            drop(inner);
            self.not_full.notify_one();
            return Ok(item);
        }
        if inner.closed {
            Err(QueueError::Closed)
        } else {
            Err(QueueError::Empty)
        }
    }

    /// Dequeue with a deadline.
    pub async fn dequeue_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        match tokio::time::timeout(timeout, self.dequeue()).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout),
        }
    }

    /// Close the queue and wake all waiters. Remaining items stay
    /// dequeueable; further enqueues fail.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items the queue holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Items evicted under the `DropOldest` policy.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let q = PacketQueue::new(8, OverflowPolicy::Block);
        for i in 0..5 {
            q.enqueue(i).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(q.dequeue().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest() {
        let q = PacketQueue::new(4, OverflowPolicy::DropOldest);
        for i in 0..10 {
            q.enqueue(i).await.unwrap();
        }
        assert_eq!(q.len(), 4);
        assert_eq!(q.dropped(), 6);
        // Last capacity items survive
        for i in 6..10 {
            assert_eq!(q.dequeue().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn test_reject_newest() {
        let q = PacketQueue::new(2, OverflowPolicy::RejectNewest);
        q.enqueue(1).await.unwrap();
        q.enqueue(2).await.unwrap();
        assert_eq!(q.enqueue(3).await, Err(QueueError::Full));
        assert_eq!(q.dequeue().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_close_drains_then_errors() {
        let q = PacketQueue::new(8, OverflowPolicy::Block);
        q.enqueue("a").await.unwrap();
        q.enqueue("b").await.unwrap();
        q.close();

        assert_eq!(q.enqueue("c").await, Err(QueueError::Closed));
        assert_eq!(q.dequeue().await.unwrap(), "a");
        assert_eq!(q.dequeue().await.unwrap(), "b");
        assert_eq!(q.dequeue().await, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_blocking_enqueue_waits_for_slot() {
        let q = Arc::new(PacketQueue::new(1, OverflowPolicy::Block));
        q.enqueue(1).await.unwrap();

        let q2 = Arc::clone(&q);
        let producer = tokio::spawn(async move { q2.enqueue(2).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(q.dequeue().await.unwrap(), 1);

        producer.await.unwrap().unwrap();
        assert_eq!(q.dequeue().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let q = Arc::new(PacketQueue::new(4, OverflowPolicy::Block));
        let q2 = Arc::clone(&q);
        let consumer = tokio::spawn(async move { q2.dequeue().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.enqueue(42).await.unwrap();
        assert_eq!(consumer.await.unwrap().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_two_blocked_consumers_both_wake() {
        let q: Arc<PacketQueue<u8>> = Arc::new(PacketQueue::new(4, OverflowPolicy::Block));
        let c1 = tokio::spawn({
            let q = Arc::clone(&q);
            async move { q.dequeue().await }
        });
        let c2 = tokio::spawn({
            let q = Arc::clone(&q);
            async move { q.dequeue().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Back-to-back enqueues must wake one consumer each, never
        // collapse into a single wakeup
        q.enqueue(1).await.unwrap();
        q.enqueue(2).await.unwrap();

        let deadline = Duration::from_secs(1);
        let a = tokio::time::timeout(deadline, c1)
            .await
            .expect("first consumer stranded")
            .unwrap()
            .unwrap();
        let b = tokio::time::timeout(deadline, c2)
            .await
            .expect("second consumer stranded")
            .unwrap()
            .unwrap();
        let mut got = [a, b];
        got.sort_unstable();
        assert_eq!(got, [1, 2]);
    }

    #[tokio::test]
    async fn test_two_blocked_producers_both_wake() {
        let q = Arc::new(PacketQueue::new(1, OverflowPolicy::Block));
        q.enqueue(0u8).await.unwrap();

        let p1 = tokio::spawn({
            let q = Arc::clone(&q);
            async move { q.enqueue(1).await }
        });
        let p2 = tokio::spawn({
            let q = Arc::clone(&q);
            async move { q.enqueue(2).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let deadline = Duration::from_secs(1);
        assert_eq!(q.dequeue().await.unwrap(), 0);
        let a = tokio::time::timeout(deadline, q.dequeue())
            .await
            .expect("first producer stranded")
            .unwrap();
        let b = tokio::time::timeout(deadline, q.dequeue())
            .await
            .expect("second producer stranded")
            .unwrap();
        let mut got = [a, b];
        got.sort_unstable();
        assert_eq!(got, [1, 2]);

        p1.await.unwrap().unwrap();
        p2.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dequeue_timeout() {
        let q: PacketQueue<u8> = PacketQueue::new(4, OverflowPolicy::Block);
        assert_eq!(
            q.dequeue_timeout(Duration::from_millis(10)).await,
            Err(QueueError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_dequeue() {
        let q: Arc<PacketQueue<u8>> = Arc::new(PacketQueue::new(4, OverflowPolicy::Block));
        let q2 = Arc::clone(&q);
        let consumer = tokio::spawn(async move { q2.dequeue().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();
        assert_eq!(consumer.await.unwrap(), Err(QueueError::Closed));
    }
}
