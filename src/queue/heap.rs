//! Binary Min-Heap of Messages
//!
//! This module implements the priority-ordered container at the heart of
//! Lineup. Messages are kept in an array-backed binary heap keyed by their
//! priority, so that the message with the numerically smallest priority is
//! always at the root.
//!
//! ## Ordering
//!
//! ```text
//!                 [p=1]
//!               /       \
//!           [p=4]       [p=2]
//!          /     \      /
//!      [p=9]  [p=5]  [p=3]
//! ```
//!
//! - `insert` appends at the end and sifts the new entry up.
//! - `extract_min` swaps the root with the last entry, shrinks the array and
//!   sifts the new root down.
//!
//! Both operations are O(log n). Messages with equal priorities come out in
//! no particular order.
//!
//! This type does no locking of its own; see [`MessageQueue`](super::MessageQueue)
//! for the shared, synchronized wrapper used by the server.

use bytes::Bytes;

/// A priority-tagged payload submitted by a client.
///
/// Messages are immutable once created. Lower priority values are dequeued
/// first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    priority: i64,
    payload: Bytes,
}

impl Message {
    /// Creates a new message.
    pub fn new(priority: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            priority,
            payload: payload.into(),
        }
    }

    /// The ordering key of this message.
    #[inline]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// The raw payload bytes.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the message, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// An unbounded priority queue of [`Message`]s, smallest priority first.
///
/// # Example
///
/// ```
/// use lineup::queue::{Message, PriorityQueue};
///
/// let mut queue = PriorityQueue::new();
/// queue.insert(Message::new(5, "low"));
/// queue.insert(Message::new(1, "urgent"));
///
/// assert_eq!(queue.extract_min().unwrap().payload().as_ref(), b"urgent");
/// assert_eq!(queue.len(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct PriorityQueue {
    heap: Vec<Message>,
}

#[inline]
fn parent(k: usize) -> usize {
    (k - 1) / 2
}

#[inline]
fn left(k: usize) -> usize {
    2 * k + 1
}

#[inline]
fn right(k: usize) -> usize {
    2 * k + 2
}

impl PriorityQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self { heap: Vec::new() }
    }

    /// Creates an empty queue with room for `capacity` messages before it
    /// needs to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
        }
    }

    /// Adds a message to the queue.
    ///
    /// Always succeeds; the backing storage grows geometrically as needed.
    pub fn insert(&mut self, message: Message) {
        self.heap.push(message);
        self.sift_up(self.heap.len() - 1);
    }

    /// Removes and returns the message with the smallest priority, or `None`
    /// if the queue is empty.
    pub fn extract_min(&mut self) -> Option<Message> {
        if self.heap.is_empty() {
            return None;
        }

        let message = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(message)
    }

    /// Returns the message that the next [`extract_min`](Self::extract_min)
    /// would remove, without removing it.
    pub fn peek(&self) -> Option<&Message> {
        self.heap.first()
    }

    /// Number of stored messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if no messages are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes every message, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.heap.len();
        self.heap.clear();
        count
    }

    #[inline]
    fn less(&self, a: usize, b: usize) -> bool {
        self.heap[a].priority < self.heap[b].priority
    }

    fn sift_up(&mut self, mut k: usize) {
        while k > 0 {
            let p = parent(k);
            if !self.less(k, p) {
                break;
            }
            self.heap.swap(k, p);
            k = p;
        }
    }

    fn sift_down(&mut self, mut k: usize) {
        let len = self.heap.len();
        loop {
            let (l, r) = (left(k), right(k));
            let mut smallest = k;

            if l < len && self.less(l, smallest) {
                smallest = l;
            }
            if r < len && self.less(r, smallest) {
                smallest = r;
            }
            if smallest == k {
                return;
            }

            self.heap.swap(k, smallest);
            k = smallest;
        }
    }
}
