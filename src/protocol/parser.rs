//! Command Line Parser
//!
//! Lineup commands are single CRLF-terminated text lines with a fixed
//! grammar, so no general pattern matching is needed: a prefix check plus a
//! digit scan classifies every line.
//!
//! ```text
//! GIVE <priority> <size>\r\n      followed by <size> raw bytes and \r\n
//! TAKE\r\n
//! PING\r\n
//! EXIT\r\n
//! ```
//!
//! Commands are case-sensitive. `<priority>` and `<size>` are unsigned
//! base-10 literals made of ASCII digits only. Anything that does not match
//! one of these shapes exactly is an unknown command.
//!
//! The parser only looks at the command line itself. Reading the GIVE
//! payload frame is left to the connection handler, which knows how many
//! bytes are still in flight.

use crate::protocol::types::CRLF;
use thiserror::Error;

/// Errors that can occur while classifying a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line is not one of the recognized command shapes
    #[error("unknown command")]
    UnknownCommand,

    /// The GIVE priority literal does not fit a signed 64-bit integer.
    ///
    /// The size was valid, so the payload that follows can still be skipped.
    #[error("priority out of range (payload size {size})")]
    PriorityOutOfRange { size: usize },

    /// The GIVE size literal does not fit in memory addressing range
    #[error("payload size out of range")]
    SizeOutOfRange,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A recognized command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Enqueue a `size`-byte payload with the given priority
    Give { priority: i64, size: usize },
    /// Dequeue the most urgent message
    Take,
    /// Liveness check
    Ping,
    /// Close the connection without a reply
    Exit,
}

impl Command {
    /// The command keyword, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Give { .. } => "GIVE",
            Command::Take => "TAKE",
            Command::Ping => "PING",
            Command::Exit => "EXIT",
        }
    }
}

/// Classifies a command line (without its trailing CRLF).
///
/// # Example
///
/// ```
/// use lineup::protocol::{parse_command, Command};
///
/// assert_eq!(parse_command(b"TAKE"), Ok(Command::Take));
/// assert_eq!(
///     parse_command(b"GIVE 5 3"),
///     Ok(Command::Give { priority: 5, size: 3 })
/// );
/// assert!(parse_command(b"take").is_err());
/// ```
pub fn parse_command(line: &[u8]) -> ParseResult<Command> {
    match line {
        b"TAKE" => Ok(Command::Take),
        b"PING" => Ok(Command::Ping),
        b"EXIT" => Ok(Command::Exit),
        _ => match line.strip_prefix(b"GIVE ") {
            Some(args) => parse_give(args),
            None => Err(ParseError::UnknownCommand),
        },
    }
}

/// Parses `<priority> <size>`.
fn parse_give(args: &[u8]) -> ParseResult<Command> {
    let mut fields = args.splitn(2, |&b| b == b' ');

    let priority = fields
        .next()
        .filter(|f| is_number(f))
        .ok_or(ParseError::UnknownCommand)?;
    let size = fields
        .next()
        .filter(|f| is_number(f))
        .ok_or(ParseError::UnknownCommand)?;

    // The frame is the payload plus its CRLF, so that sum must not overflow
    let size = parse_decimal(size)
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| n.checked_add(CRLF.len()).is_some())
        .ok_or(ParseError::SizeOutOfRange)?;
    let priority = parse_decimal(priority)
        .and_then(|n| i64::try_from(n).ok())
        .ok_or(ParseError::PriorityOutOfRange { size })?;

    Ok(Command::Give { priority, size })
}

#[inline]
fn is_number(field: &[u8]) -> bool {
    !field.is_empty() && field.iter().all(u8::is_ascii_digit)
}

/// Accumulates ASCII digits, returning `None` on overflow.
fn parse_decimal(digits: &[u8]) -> Option<u64> {
    digits.iter().try_fold(0u64, |acc, &d| {
        acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
    })
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command(b"TAKE"), Ok(Command::Take));
        assert_eq!(parse_command(b"PING"), Ok(Command::Ping));
        assert_eq!(parse_command(b"EXIT"), Ok(Command::Exit));
    }

    #[test]
    fn test_parse_give() {
        assert_eq!(
            parse_command(b"GIVE 5 3"),
            Ok(Command::Give {
                priority: 5,
                size: 3
            })
        );
        assert_eq!(
            parse_command(b"GIVE 0 0"),
            Ok(Command::Give {
                priority: 0,
                size: 0
            })
        );
        assert_eq!(
            parse_command(b"GIVE 007 0010"),
            Ok(Command::Give {
                priority: 7,
                size: 10
            })
        );
    }

    #[test]
    fn test_commands_are_case_sensitive() {
        assert_eq!(parse_command(b"ping"), Err(ParseError::UnknownCommand));
        assert_eq!(parse_command(b"Take"), Err(ParseError::UnknownCommand));
        assert_eq!(parse_command(b"give 1 1"), Err(ParseError::UnknownCommand));
    }

    #[test]
    fn test_unknown_commands() {
        assert_eq!(parse_command(b"FOO"), Err(ParseError::UnknownCommand));
        assert_eq!(parse_command(b""), Err(ParseError::UnknownCommand));
        assert_eq!(parse_command(b"PING "), Err(ParseError::UnknownCommand));
        assert_eq!(parse_command(b"TAKE 1"), Err(ParseError::UnknownCommand));
        assert_eq!(parse_command(b"\xff\xfe"), Err(ParseError::UnknownCommand));
    }

    #[test]
    fn test_malformed_give() {
        let lines: [&[u8]; 11] = [
            b"GIVE",
            b"GIVE ",
            b"GIVE 5",
            b"GIVE 5 ",
            b"GIVE -5 3",
            b"GIVE +5 3",
            b"GIVE 5 3 1",
            b"GIVE 5  3",
            b"GIVE a 3",
            b"GIVE 5 3x",
            b"GIVE  5 3",
        ];

        for line in lines {
            assert_eq!(
                parse_command(line),
                Err(ParseError::UnknownCommand),
                "line {:?}",
                String::from_utf8_lossy(line)
            );
        }
    }

    #[test]
    fn test_give_priority_bounds() {
        assert_eq!(
            parse_command(b"GIVE 9223372036854775807 1"),
            Ok(Command::Give {
                priority: i64::MAX,
                size: 1
            })
        );
        assert_eq!(
            parse_command(b"GIVE 9223372036854775808 4"),
            Err(ParseError::PriorityOutOfRange { size: 4 })
        );
        assert_eq!(
            parse_command(b"GIVE 99999999999999999999999 4"),
            Err(ParseError::PriorityOutOfRange { size: 4 })
        );
    }

    #[test]
    fn test_give_size_overflow() {
        assert_eq!(
            parse_command(b"GIVE 1 99999999999999999999999"),
            Err(ParseError::SizeOutOfRange)
        );
        // An oversized size wins over an oversized priority
        assert_eq!(
            parse_command(b"GIVE 99999999999999999999999 99999999999999999999999"),
            Err(ParseError::SizeOutOfRange)
        );
    }

    #[test]
    fn test_command_name() {
        assert_eq!(Command::Take.name(), "TAKE");
        assert_eq!(
            Command::Give {
                priority: 1,
                size: 1
            }
            .name(),
            "GIVE"
        );
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"PING\r\n"), Some(4));
        assert_eq!(find_crlf(b"PING\r"), None);
        assert_eq!(find_crlf(b"PING\n"), None);
        assert_eq!(find_crlf(b""), None);
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"a\rb\r\n"), Some(3));
    }
}
