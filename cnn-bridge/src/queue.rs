//! Blocking command queue
//!
//! Thread-safe FIFO shared between the submitter threads of a connection
//! and its single worker thread. `push` never blocks; `pop` parks the
//! calling thread on a condition variable until an item arrives.
//!
//! Only one thread is expected to consume from a given queue.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors returned when an item cannot be queued
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("command queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("failed to allocate command queue storage")]
    AllocationFailed,
}

/// FIFO queue with blocking pop
#[derive(Debug)]
pub struct CommandQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    /// Maximum depth accepted by `push`; `None` means unbounded.
    capacity: Option<usize>,
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CommandQueue<T> {
    /// Create an empty, unbounded queue
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            capacity: None,
        }
    }

    /// Create a queue with `initial` slots reserved up front and an
    /// optional depth limit.
    pub fn with_capacity(initial: usize, capacity: Option<usize>) -> Result<Self, QueueError> {
        let mut items = VecDeque::new();
        items
            .try_reserve(initial)
            .map_err(|_| QueueError::AllocationFailed)?;

        Ok(Self {
            items: Mutex::new(items),
            available: Condvar::new(),
            capacity,
        })
    }

    // Queue operations never panic while holding the lock, so a poisoned
    // mutex still guards a consistent deque.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert at the tail and wake one blocked consumer.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut items = self.lock();
        if let Some(capacity) = self.capacity {
            if items.len() >= capacity {
                return Err(QueueError::Full { capacity });
            }
        }
        Self::insert(&mut items, item)?;
        drop(items);

        self.available.notify_one();
        Ok(())
    }

    /// Insert at the tail ignoring the depth limit.
    ///
    /// Used for the teardown commands, which must be queued even when
    /// submitters have filled the queue.
    pub fn push_internal(&self, item: T) -> Result<(), QueueError> {
        let mut items = self.lock();
        Self::insert(&mut items, item)?;
        drop(items);

        self.available.notify_one();
        Ok(())
    }

    fn insert(items: &mut VecDeque<T>, item: T) -> Result<(), QueueError> {
        items
            .try_reserve(1)
            .map_err(|_| QueueError::AllocationFailed)?;
        items.push_back(item);
        Ok(())
    }

    /// Remove and return the head, blocking while the queue is empty.
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self
                .available
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove and return the head without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Whether an item is waiting. Non-blocking.
    pub fn has_item(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Current depth
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Configured depth limit, if any
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = CommandQueue::new();
        for i in 0..10 {
            queue.push(i).unwrap();
        }

        let popped: Vec<i32> = (0..10).map(|_| queue.pop()).collect();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(CommandQueue::new());
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let item: &str = queue.pop();
                tx.send(item).unwrap();
            })
        };

        // Nothing queued yet, so the consumer must still be parked
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        queue.push("wake").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "wake");
        consumer.join().unwrap();
    }

    #[test]
    fn test_has_item_and_try_pop() {
        let queue = CommandQueue::new();
        assert!(!queue.has_item());
        assert_eq!(queue.try_pop(), None);

        queue.push(7u8).unwrap();
        assert!(queue.has_item());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_pop(), Some(7));
        assert!(!queue.has_item());
    }

    #[test]
    fn test_bounded_queue_rejects_when_full() {
        let queue = CommandQueue::with_capacity(2, Some(2)).unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();

        assert_eq!(queue.push(3), Err(QueueError::Full { capacity: 2 }));
        assert_eq!(queue.len(), 2);

        queue.pop();
        queue.push(3).unwrap();
        assert_eq!(queue.capacity(), Some(2));
    }

    #[test]
    fn test_push_internal_ignores_capacity() {
        let queue = CommandQueue::with_capacity(1, Some(1)).unwrap();
        queue.push("user").unwrap();
        queue.push_internal("stop").unwrap();

        assert_eq!(queue.pop(), "user");
        assert_eq!(queue.pop(), "stop");
    }

    #[test]
    fn test_many_producers_single_consumer() {
        let queue = Arc::new(CommandQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push((p, i)).unwrap();
                    }
                })
            })
            .collect();

        let mut last_seen = [None::<i32>; 4];
        for _ in 0..1000 {
            let (p, i) = queue.pop();
            // Per-producer order is preserved
            if let Some(prev) = last_seen[p] {
                assert!(i > prev);
            }
            last_seen[p] = Some(i);
        }

        for producer in producers {
            producer.join().unwrap();
        }
        assert!(!queue.has_item());
    }

    #[test]
    fn test_error_messages() {
        assert!(QueueError::Full { capacity: 8 }.to_string().contains('8'));
        assert!(QueueError::AllocationFailed.to_string().contains("allocate"));
    }
}
