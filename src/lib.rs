//! # Lineup - A Tiny In-Memory Priority Message Queue
//!
//! Lineup is a network-accessible priority message queue. Clients connect
//! over TCP, hand over byte payloads tagged with an integer priority, and
//! later take back the most urgent pending payload. All state lives in
//! memory and is gone after a restart.
//!
//! ## Features
//!
//! - **Priority Ordering**: A binary heap always yields the smallest priority first
//! - **Binary-Safe Payloads**: Messages are arbitrary bytes of any length
//! - **Async I/O**: Built on Tokio, one lightweight task per client
//! - **Safe Sharing**: One mutex-guarded queue shared by every connection
//! - **Idle Timeout**: Silent clients are disconnected automatically
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Lineup                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Acceptor)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────┐     │
//! │                     │  Command    │    │       MessageQueue       │     │
//! │                     │  Parser     │    │  Mutex<PriorityQueue>    │     │
//! │                     └─────────────┘    └──────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use lineup::queue::MessageQueue;
//! use lineup::server::{Server, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // The one queue every connection shares
//!     let queue = Arc::new(MessageQueue::new());
//!
//!     // Bind and serve until Ctrl+C
//!     let server = Server::bind(ServerConfig::default(), queue).await?;
//!     server.run_until(tokio::signal::ctrl_c()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol
//!
//! | Request                              | Reply                                   |
//! |--------------------------------------|-----------------------------------------|
//! | `GIVE <priority> <size>\r\n<bytes>\r\n` | `+OK\r\n`                            |
//! | `TAKE\r\n`                           | `$<len>\r\n<bytes>\r\n` or `-NO_MESSAGES\r\n` |
//! | `PING\r\n`                           | `+PONG\r\n`                             |
//! | `EXIT\r\n`                           | connection closed, no reply             |
//! | anything else                        | `-INVALID_COMMAND\r\n`                  |
//!
//! A message with a numerically smaller priority is taken before one with a
//! larger priority. Messages with equal priority come out in no particular
//! order.
//!
//! ## Module Overview
//!
//! - [`queue`]: Binary heap and the shared, synchronized queue
//! - [`protocol`]: Command line parser and reply encoding
//! - [`commands`]: Command execution and per-command logging
//! - [`connection`]: Per-client state machine, framing and timeouts
//! - [`server`]: Listener, accept loop and graceful shutdown

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod queue;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionHandler, ConnectionStats};
pub use protocol::{parse_command, Command, ParseError, Reply};
pub use queue::{Message, MessageQueue, PriorityQueue};
pub use server::{Server, ServerConfig, ServerError};

/// The default port Lineup listens on
pub const DEFAULT_PORT: u16 = 9876;

/// The default host Lineup binds to (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default idle timeout, in seconds, before a silent client is disconnected
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Version of Lineup
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
