//! Queue Module
//!
//! This module provides the message storage for Lineup: a binary min-heap of
//! priority-tagged payloads and the synchronized wrapper that every client
//! connection shares.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MessageQueue                            │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │              Mutex<PriorityQueue>                     │  │
//! │  │     binary heap, smallest priority at the root        │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │        gives / takes / empty_takes (AtomicU64)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use lineup::queue::MessageQueue;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let queue = Arc::new(MessageQueue::new());
//!
//! queue.give(10, Bytes::from("later"));
//! queue.give(-1, Bytes::from("first"));
//!
//! let next = queue.take().unwrap();
//! assert_eq!(next.priority(), -1);
//! ```

pub mod heap;
pub mod shared;

pub use heap::{Message, PriorityQueue};
pub use shared::{MessageQueue, QueueStats};
