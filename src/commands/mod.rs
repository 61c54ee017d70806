//! Command Handler Module
//!
//! This module implements the command processing layer for Lineup.
//! It receives parsed commands (and, for GIVE, the payload frame the
//! connection read), executes them against the shared queue, and returns
//! the reply to send.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Command parser  │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Execute      │
//! │  - Reply        │
//! │  - Log outcome  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  MessageQueue   │  (queue module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::{CommandHandler, FrameError};
