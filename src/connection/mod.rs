//! Connection Handler Module
//!
//! This module manages individual client connections to Lineup.
//! Each client connection is handled by its own async task, so one slow or
//! idle client never holds up the others or the accept loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read line   │───>│ Parse cmd   │───>│ Read frame  │     │
//! │  └─────────────┘    └─────────────┘    │ (GIVE only) │     │
//! │                                        └──────┬──────┘     │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Execute +   │        │
//! │                                      │ send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Framing**: Partial reads are accumulated until a line or payload is complete
//! - **Idle Timeout**: Each read is bounded, silent clients are dropped
//! - **Statistics**: Tracks live and lifetime connections plus traffic counters

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
