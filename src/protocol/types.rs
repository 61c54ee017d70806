//! Lineup Wire Replies
//!
//! Every reply the server sends starts with a one-byte type prefix and ends
//! with CRLF (`\r\n`):
//!
//! - `+` Status line, e.g. `+OK\r\n`, `+PONG\r\n`
//! - `-` Error line, e.g. `-NO_MESSAGES\r\n`, `-INVALID_COMMAND\r\n`
//! - `$` Message: `$<length>\r\n<payload bytes>\r\n`
//!
//! Message payloads are binary-safe; status and error text never contain CRLF.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used by every line of the protocol
pub const CRLF: &[u8] = b"\r\n";

/// Reply type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const MESSAGE: u8 = b'$';
}

/// Error codes sent back to clients.
pub mod code {
    pub const NO_MESSAGES: &str = "NO_MESSAGES";
    pub const INVALID_COMMAND: &str = "INVALID_COMMAND";
    pub const MISSING_TERMINATOR: &str = "MISSING_TERMINATOR";
    pub const PRIORITY_OUT_OF_RANGE: &str = "PRIORITY_OUT_OF_RANGE";
    pub const SIZE_OUT_OF_RANGE: &str = "SIZE_OUT_OF_RANGE";
}

/// A single response written back to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Format: `+<text>\r\n`
    Status(String),

    /// Format: `-<text>\r\n`
    Error(String),

    /// A dequeued payload.
    /// Format: `$<length>\r\n<data>\r\n`
    Message(Bytes),
}

impl Reply {
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn message(data: impl Into<Bytes>) -> Self {
        Reply::Message(data.into())
    }

    /// Reply to a successful GIVE
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Reply to PING
    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// Reply to TAKE on an empty queue
    pub fn no_messages() -> Self {
        Reply::error(code::NO_MESSAGES)
    }

    /// Reply to a line that is not a known command
    pub fn invalid_command() -> Self {
        Reply::error(code::INVALID_COMMAND)
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(prefix::STATUS);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Message(data) => {
                buf.reserve(data.len() + 16);
                buf.push(prefix::MESSAGE);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
        }
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Message(data) => write!(f, "(message, {} bytes)", data.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        assert_eq!(Reply::ok().serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_pong_response() {
        assert_eq!(Reply::pong().serialize(), b"+PONG\r\n");
    }

    #[test]
    fn test_no_messages_response() {
        assert_eq!(Reply::no_messages().serialize(), b"-NO_MESSAGES\r\n");
    }

    #[test]
    fn test_invalid_command_response() {
        assert_eq!(Reply::invalid_command().serialize(), b"-INVALID_COMMAND\r\n");
    }

    #[test]
    fn test_message_serialize() {
        let reply = Reply::message(Bytes::from("abc"));
        assert_eq!(reply.serialize(), b"$3\r\nabc\r\n");
    }

    #[test]
    fn test_empty_message_serialize() {
        assert_eq!(Reply::message(Bytes::new()).serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_binary_message_serialize() {
        let reply = Reply::message(Bytes::from_static(b"a\r\n\x00b"));
        assert_eq!(reply.serialize(), b"$5\r\na\r\n\x00b\r\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(Reply::pong().to_string(), "PONG");
        assert_eq!(Reply::no_messages().to_string(), "(error) NO_MESSAGES");
        assert_eq!(
            Reply::message(Bytes::from("hello")).to_string(),
            "(message, 5 bytes)"
        );
    }
}
