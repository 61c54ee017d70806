//! Lineup Protocol Implementation
//!
//! This module provides the line-oriented wire protocol spoken between Lineup
//! clients and the server.
//!
//! ## Overview
//!
//! Requests are CRLF-terminated command lines; `GIVE` is additionally
//! followed by a fixed-length binary frame. Replies reuse a small subset of
//! the RESP framing (`+status`, `-error`, `$length` bulk payload).
//!
//! ## Modules
//!
//! - `types`: Defines the `Reply` enum and serialization
//! - `parser`: Fixed-grammar command line parser
//!
//! ## Example
//!
//! ```
//! use lineup::protocol::{parse_command, Command, Reply};
//!
//! let command = parse_command(b"GIVE 5 3").unwrap();
//! assert_eq!(command, Command::Give { priority: 5, size: 3 });
//!
//! assert_eq!(Reply::ok().serialize(), b"+OK\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{find_crlf, parse_command, Command, ParseError, ParseResult};
pub use types::{code, Reply, CRLF};
