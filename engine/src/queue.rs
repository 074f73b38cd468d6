//! Bounded inter-stage queues implementing the per-link overflow policies
//! in "load-bearing" matrix. Plain `tokio::sync::mpsc` gives only one
//! discipline (block the sender); the hot path needs "drop oldest" and the
//! cold path needs true backpressure, sometimes on the same queue type, so
//! this is a small ring buffer over `Notify` rather than two channel kinds.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

pub struct DropOldestQueue<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
    not_empty: Notify,
    dropped: std::sync::atomic::AtomicU64,
}

impl<T> DropOldestQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Notify::new(),
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Non-blocking push. When full, evicts the oldest entry first --
    /// "newest wins".
    pub fn push(&self, item: T) {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        guard.push_back(item);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Push that gives the queue a brief grace period to drain before
    /// falling back to drop-oldest (the Parser -> BookEngine link's
    /// "block briefly; then drop oldest" policy).
    pub async fn push_with_grace(&self, item: T, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            {
                let guard = self.inner.lock().expect("queue mutex poisoned");
                if guard.len() < self.capacity {
                    drop(guard);
                    break;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.push(item);
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }

    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.not_empty.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest_once_at_capacity() {
        let queue: DropOldestQueue<i32> = DropOldestQueue::new(2);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.dropped_count(), 1);
    }

    /// Pushing far beyond capacity leaves only the most recent item, with
    /// the drop count reflecting the rest.
    #[tokio::test]
    async fn backpressure_drop_keeps_only_the_newest_view() {
        let queue: DropOldestQueue<u64> = DropOldestQueue::new(16);
        for i in 0..10_000u64 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 16);
        assert_eq!(queue.dropped_count(), 10_000 - 16);
        let mut last = None;
        while let Some(v) = queue.try_pop() {
            last = Some(v);
        }
        assert_eq!(last, Some(9_999));
    }
}
