//! Shared, Thread-Safe Message Queue
//!
//! Every client connection pushes into and pops from the same queue, so the
//! heap is wrapped in a single `Mutex`. Both `give` and `take` hold the lock
//! for the whole heap operation, which makes concurrent inserts and
//! extractions apply exactly once, in some serial order.
//!
//! ```text
//!  conn 1 ──┐
//!  conn 2 ──┼──> MessageQueue ──> Mutex<PriorityQueue>
//!  conn N ──┘         │
//!                     └──> AtomicU64 counters (gives / takes / misses)
//! ```

use crate::queue::heap::{Message, PriorityQueue};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Initial heap capacity
const INITIAL_CAPACITY: usize = 10;

/// A snapshot of queue activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages currently stored
    pub len: usize,
    /// Total messages inserted
    pub gives: u64,
    /// Total messages extracted
    pub takes: u64,
    /// TAKE attempts that found the queue empty
    pub empty_takes: u64,
}

/// The process-wide message queue shared by all connections.
///
/// This struct is designed to be wrapped in an `Arc` and handed to every
/// connection handler.
///
/// # Example
///
/// ```
/// use lineup::queue::MessageQueue;
/// use bytes::Bytes;
///
/// let queue = MessageQueue::new();
/// queue.give(2, Bytes::from("world"));
/// queue.give(1, Bytes::from("hello"));
///
/// assert_eq!(queue.take().unwrap().payload(), &Bytes::from("hello"));
/// assert_eq!(queue.len(), 1);
/// ```
pub struct MessageQueue {
    inner: Mutex<PriorityQueue>,
    gives: AtomicU64,
    takes: AtomicU64,
    empty_takes: AtomicU64,
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .field("gives", &self.gives.load(Ordering::Relaxed))
            .field("takes", &self.takes.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PriorityQueue::with_capacity(INITIAL_CAPACITY)),
            gives: AtomicU64::new(0),
            takes: AtomicU64::new(0),
            empty_takes: AtomicU64::new(0),
        }
    }

    /// Locks the heap.
    ///
    /// A panic while the lock was held cannot leave the heap half-sifted in a
    /// way that loses messages, so a poisoned lock is simply taken over.
    fn lock(&self) -> MutexGuard<'_, PriorityQueue> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a message, returning the queue length after the insert.
    pub fn give(&self, priority: i64, payload: Bytes) -> usize {
        let mut heap = self.lock();
        heap.insert(Message::new(priority, payload));
        self.gives.fetch_add(1, Ordering::Relaxed);
        heap.len()
    }

    /// Removes the message with the smallest priority.
    ///
    /// Returns `None` without touching the queue if it is empty.
    pub fn take(&self) -> Option<Message> {
        let message = self.lock().extract_min();
        match message {
            Some(_) => self.takes.fetch_add(1, Ordering::Relaxed),
            None => self.empty_takes.fetch_add(1, Ordering::Relaxed),
        };
        message
    }

    /// Priority of the message the next `take` would return.
    pub fn peek_priority(&self) -> Option<i64> {
        self.lock().peek().map(Message::priority)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every stored message, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.lock().clear()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.len(),
            gives: self.gives.load(Ordering::Relaxed),
            takes: self.takes.load(Ordering::Relaxed),
            empty_takes: self.empty_takes.load(Ordering::Relaxed),
        }
    }
}
