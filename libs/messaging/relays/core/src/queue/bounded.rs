//! Shared-memory bounded queue

use super::MessageQueue;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use types::StateMessage;

/// Fixed-capacity FIFO that evicts its oldest entry when full
///
/// Eviction and insertion happen under one lock, so the length never
/// exceeds the capacity as seen by any observer.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    capacity: usize,
    evicted: AtomicU64,
    notify: Arc<Notify>,
}

impl<T> BoundedQueue<T> {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            available: Condvar::new(),
            capacity,
            evicted: AtomicU64::new(0),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn put_overflow_aware(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };

        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        self.available.notify_one();
        self.notify.notify_one();
        evicted
    }

    pub fn try_get(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Wait up to `timeout` for an item
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    /// Remove everything, oldest first
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items discarded to admit newer ones
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Wake any thread blocked in [`BoundedQueue::pop_timeout`]
    pub fn wake_all(&self) {
        self.available.notify_all();
    }
}

impl MessageQueue for BoundedQueue<StateMessage> {
    fn put_overflow_aware(&self, message: StateMessage) -> Option<StateMessage> {
        BoundedQueue::put_overflow_aware(self, message)
    }

    fn try_get(&self) -> Option<StateMessage> {
        BoundedQueue::try_get(self)
    }

    fn len(&self) -> usize {
        BoundedQueue::len(self)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn notifier(&self) -> Arc<Notify> {
        BoundedQueue::notifier(self)
    }
}
