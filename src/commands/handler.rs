//! Command Handler Module
//!
//! This module executes Lineup commands against the shared message queue and
//! builds the reply for each one. It also emits the per-command log record
//! (command, outcome, parameters, client address, resulting queue length).
//!
//! ## Supported Commands
//!
//! - `GIVE priority size` + payload frame - Enqueue a message
//! - `TAKE` - Dequeue the message with the smallest priority
//! - `PING` - Test connection
//! - `EXIT` - Close the connection (no reply)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  give()     │    │  take()     │    │  ping()     │     │
//! │  └──────┬──────┘    └──────┬──────┘    └─────────────┘     │
//! │         │                  │                                │
//! │         ▼                  ▼                                │
//! │              Arc<MessageQueue>                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reading the GIVE payload off the socket is the connection handler's job;
//! by the time `give` is called the whole frame has arrived and been
//! validated.

use crate::protocol::{code, Command, ParseError, Reply};
use crate::queue::MessageQueue;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Why a GIVE payload frame was rejected after it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The two bytes after the payload were not CRLF
    MissingTerminator,
    /// The priority literal overflowed; the frame was read and dropped
    PriorityOutOfRange,
}

impl FrameError {
    fn code(self) -> &'static str {
        match self {
            FrameError::MissingTerminator => code::MISSING_TERMINATOR,
            FrameError::PriorityOutOfRange => code::PRIORITY_OUT_OF_RANGE,
        }
    }
}

/// Executes commands for one or more connections.
///
/// Cloning is cheap: every clone shares the same queue.
#[derive(Clone, Debug)]
pub struct CommandHandler {
    queue: Arc<MessageQueue>,
}

impl CommandHandler {
    /// Creates a new command handler over the given queue.
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue }
    }

    /// The queue this handler operates on.
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Enqueues a fully-read GIVE payload.
    pub fn give(&self, priority: i64, payload: Bytes, client: &SocketAddr) -> Reply {
        let size = payload.len();
        let queue_size = self.queue.give(priority, payload);
        info!(
            client = %client,
            priority,
            size,
            queue_size,
            "GIVE successful"
        );
        Reply::ok()
    }

    /// Reports a GIVE whose frame arrived but could not be accepted.
    ///
    /// Nothing is inserted into the queue.
    pub fn give_rejected(
        &self,
        error: FrameError,
        size: usize,
        client: &SocketAddr,
    ) -> Reply {
        warn!(
            client = %client,
            size,
            reason = error.code(),
            queue_size = self.queue.len(),
            "GIVE failed"
        );
        Reply::error(error.code())
    }

    /// Dequeues the message with the smallest priority.
    pub fn take(&self, client: &SocketAddr) -> Reply {
        match self.queue.take() {
            Some(message) => {
                info!(
                    client = %client,
                    priority = message.priority(),
                    size = message.len(),
                    queue_size = self.queue.len(),
                    "TAKE successful"
                );
                Reply::message(message.into_payload())
            }
            None => {
                info!(client = %client, queue_size = 0, "TAKE found no messages");
                Reply::no_messages()
            }
        }
    }

    pub fn ping(&self, client: &SocketAddr) -> Reply {
        info!(client = %client, "PING successful");
        Reply::pong()
    }

    /// Logs an EXIT. The connection closes without a reply.
    pub fn exit(&self, client: &SocketAddr) {
        info!(client = %client, "EXIT successful");
    }

    /// Builds the reply for a command line that failed to parse.
    pub fn reject(&self, error: &ParseError, client: &SocketAddr) -> Reply {
        let reply = match error {
            ParseError::UnknownCommand => Reply::invalid_command(),
            ParseError::PriorityOutOfRange { .. } => Reply::error(code::PRIORITY_OUT_OF_RANGE),
            ParseError::SizeOutOfRange => Reply::error(code::SIZE_OUT_OF_RANGE),
        };
        warn!(client = %client, error = %error, "Rejected command");
        reply
    }

    /// Logs a command that was cut short by a transport failure.
    pub fn aborted(&self, command: &Command, client: &SocketAddr, reason: &str) {
        warn!(
            client = %client,
            command = command.name(),
            reason,
            queue_size = self.queue.len(),
            "Command aborted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(MessageQueue::new()))
    }

    fn client() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();
        assert_eq!(handler.ping(&client()), Reply::pong());
    }

    #[test]
    fn test_give_then_take() {
        let handler = create_handler();

        let response = handler.give(5, Bytes::from("abc"), &client());
        assert_eq!(response, Reply::ok());
        assert_eq!(handler.queue().len(), 1);

        let response = handler.take(&client());
        assert_eq!(response.serialize(), b"$3\r\nabc\r\n");
        assert!(handler.queue().is_empty());
    }

    #[test]
    fn test_take_empty() {
        let handler = create_handler();

        let response = handler.take(&client());
        assert_eq!(response.serialize(), b"-NO_MESSAGES\r\n");
        assert_eq!(handler.queue().len(), 0);
    }

    #[test]
    fn test_take_order() {
        let handler = create_handler();
        handler.give(3, Bytes::from("three"), &client());
        handler.give(1, Bytes::from("one"), &client());
        handler.give(2, Bytes::from("two"), &client());

        assert_eq!(handler.take(&client()), Reply::message(Bytes::from("one")));
        assert_eq!(handler.take(&client()), Reply::message(Bytes::from("two")));
        assert_eq!(handler.take(&client()), Reply::message(Bytes::from("three")));
        assert_eq!(handler.take(&client()), Reply::no_messages());
    }

    #[test]
    fn test_reject() {
        let handler = create_handler();

        assert_eq!(
            handler.reject(&ParseError::UnknownCommand, &client()),
            Reply::invalid_command()
        );
        assert_eq!(
            handler
                .reject(&ParseError::SizeOutOfRange, &client())
                .serialize(),
            b"-SIZE_OUT_OF_RANGE\r\n"
        );
        assert_eq!(
            handler
                .reject(&ParseError::PriorityOutOfRange { size: 1 }, &client())
                .serialize(),
            b"-PRIORITY_OUT_OF_RANGE\r\n"
        );
    }

    #[test]
    fn test_give_rejected_does_not_insert() {
        let handler = create_handler();

        let response = handler.give_rejected(FrameError::MissingTerminator, 3, &client());
        assert_eq!(response.serialize(), b"-MISSING_TERMINATOR\r\n");
        assert!(handler.queue().is_empty());
    }

    #[test]
    fn test_clones_share_queue() {
        let handler = create_handler();
        let other = handler.clone();

        handler.give(1, Bytes::from("x"), &client());
        assert_eq!(other.queue().len(), 1);
    }
}
