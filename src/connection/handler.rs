//! Connection Handler Module
//!
//! This module handles individual client connections to Lineup.
//! Each client gets its own handler task that runs in a loop,
//! reading command lines and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler created by the acceptor, task spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read a CRLF line        │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse command           │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ GIVE: read size+2 bytes │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute, send reply     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. EXIT / idle timeout / peer close / error / server shutdown
//!        │
//!        ▼
//! 5. Socket closed, live connection count decremented, task ends
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. TCP is a stream protocol, so a
//! single read may hold half a command line, several pipelined commands, or
//! a GIVE line together with part of its payload. Command lines are cut at
//! the first CRLF; a GIVE payload is cut at exactly `size` bytes no matter
//! how many reads it took to arrive.
//!
//! ## Timeouts
//!
//! Every individual socket read is bounded by the idle timeout, so the
//! deadline is re-armed by each successful (even partial) read.

use crate::commands::{CommandHandler, FrameError};
use crate::protocol::{find_crlf, parse_command, Command, ParseError, Reply, CRLF};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Maximum length of a command line, CRLF excluded (64 KB)
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Largest single reservation made while a payload frame is arriving.
/// The declared size is never trusted for one big allocation.
const MAX_FRAME_RESERVE: usize = 64 * 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Currently open connections.
    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Connections accepted since startup.
    pub fn total(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }
}

/// Handles a single client connection.
///
/// This struct manages the read buffer, command parsing, payload framing and
/// reply sending for one connected client. It is generic over the stream so
/// it can be driven by a `TcpStream` or by an in-memory test stream.
///
/// The live connection counter is incremented when the handler is created
/// and decremented when it is dropped, so it moves exactly once in each
/// direction however the connection ends.
pub struct ConnectionHandler<S> {
    /// The client stream, with buffered writes
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Executes commands against the shared queue
    command_handler: CommandHandler,

    /// How long a single read may wait before the client is dropped
    idle_timeout: Duration,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Server shutdown notification, if the handler belongs to a server
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `idle_timeout` - Maximum wait for any single read
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        idle_timeout: Duration,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            idle_timeout,
            stats,
            shutdown: None,
        }
    }

    /// Makes the handler stop between reads once `shutdown` turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Runs the main connection loop.
    ///
    /// This method reads commands from the client, executes them, and sends
    /// back replies until the client exits, disconnects, idles out, or an
    /// error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Connection handler started");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::Timeout(idle) => {
                    info!(client = %self.addr, idle_secs = idle.as_secs_f64(), "Client timed out")
                }
                ConnectionError::Shutdown => {
                    info!(client = %self.addr, "Closing connection for server shutdown")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    info!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        // After a stalled write the final flush would stall too; dropping
        // the stream still closes the socket.
        if !matches!(
            result,
            Err(ConnectionError::Timeout(_) | ConnectionError::Shutdown)
        ) {
            if let Err(e) = self.stream.shutdown().await {
                trace!(client = %self.addr, error = %e, "Socket shutdown failed");
            }
        }
        result
    }

    /// The read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let line = self.read_line().await?;

            let reply = match parse_command(&line) {
                Ok(Command::Exit) => {
                    self.stats.command_processed();
                    self.command_handler.exit(&self.addr);
                    return Ok(());
                }
                Ok(Command::Ping) => self.command_handler.ping(&self.addr),
                Ok(Command::Take) => self.command_handler.take(&self.addr),
                Ok(command @ Command::Give { priority, size }) => {
                    self.handle_give(command, Some(priority), size).await?
                }
                Err(ParseError::PriorityOutOfRange { size }) => {
                    let command = Command::Give { priority: 0, size };
                    self.handle_give(command, None, size).await?
                }
                Err(e @ ParseError::SizeOutOfRange) => {
                    // The payload length is unknown, so the rest of the
                    // stream cannot be framed any more.
                    let reply = self.command_handler.reject(&e, &self.addr);
                    self.send_response(&reply).await?;
                    return Err(ConnectionError::FramingLost);
                }
                Err(e) => self.command_handler.reject(&e, &self.addr),
            };

            self.stats.command_processed();
            self.send_response(&reply).await?;
        }
    }

    /// Reads a GIVE payload frame and enqueues it.
    ///
    /// `priority` is `None` when the priority literal overflowed: the frame
    /// is still consumed so the connection stays in sync, then dropped.
    async fn handle_give(
        &mut self,
        command: Command,
        priority: Option<i64>,
        size: usize,
    ) -> Result<Reply, ConnectionError> {
        let (payload, terminated) = match self.read_frame(size).await {
            Ok(frame) => frame,
            Err(e) => {
                self.command_handler
                    .aborted(&command, &self.addr, &e.to_string());
                return Err(e);
            }
        };

        let reply = match (priority, terminated) {
            (_, false) => {
                self.command_handler
                    .give_rejected(FrameError::MissingTerminator, size, &self.addr)
            }
            (None, true) => {
                self.command_handler
                    .give_rejected(FrameError::PriorityOutOfRange, size, &self.addr)
            }
            (Some(priority), true) => self.command_handler.give(priority, payload, &self.addr),
        };

        Ok(reply)
    }

    /// Reads the next CRLF-terminated line, returning it without the CRLF.
    async fn read_line(&mut self) -> Result<BytesMut, ConnectionError> {
        // Bytes before this offset are known to hold no CRLF
        let mut scanned = 0;

        loop {
            if let Some(pos) = find_crlf(&self.buffer[scanned..]).map(|pos| pos + scanned) {
                let mut line = self.buffer.split_to(pos + CRLF.len());
                line.truncate(pos);
                trace!(
                    client = %self.addr,
                    length = pos,
                    remaining = self.buffer.len(),
                    "Read command line"
                );
                return Ok(line);
            }

            if self.buffer.len() > MAX_LINE_LENGTH {
                warn!(
                    client = %self.addr,
                    size = self.buffer.len(),
                    "Command line too long"
                );
                return Err(ConnectionError::LineTooLong);
            }

            // A trailing CR may pair with an LF from the next read
            scanned = self.buffer.len().saturating_sub(1);

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            self.read_more_data().await?;
        }
    }

    /// Reads exactly `size` payload bytes plus the two terminator bytes.
    ///
    /// Returns the payload and whether the terminator was CRLF.
    async fn read_frame(&mut self, size: usize) -> Result<(Bytes, bool), ConnectionError> {
        let needed = size
            .checked_add(CRLF.len())
            .ok_or(ConnectionError::FramingLost)?;

        while self.buffer.len() < needed {
            let missing = needed - self.buffer.len();
            let spare = self.buffer.capacity() - self.buffer.len();
            if spare < missing.min(1024) {
                self.buffer.reserve(missing.min(MAX_FRAME_RESERVE));
            }

            self.read_more_data().await?;
            trace!(
                client = %self.addr,
                received = self.buffer.len().min(needed),
                needed,
                "Reading payload frame"
            );
        }

        let mut frame = self.buffer.split_to(needed);
        let terminated = &frame[size..] == CRLF;
        frame.truncate(size);

        Ok((frame.freeze(), terminated))
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        let read = tokio::time::timeout(
            self.idle_timeout,
            self.stream.get_mut().read_buf(&mut self.buffer),
        );

        let result = match self.shutdown.as_mut() {
            Some(shutdown) => tokio::select! {
                result = read => result,
                _ = wait_for_shutdown(shutdown) => return Err(ConnectionError::Shutdown),
            },
            None => read.await,
        };

        let n = result.map_err(|_| ConnectionError::Timeout(self.idle_timeout))??;

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial command or payload in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a reply to the client.
    ///
    /// A peer that stops reading gets the same idle timeout as one that
    /// stops writing.
    async fn send_response(&mut self, response: &Reply) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        let stream = &mut self.stream;
        let write = tokio::time::timeout(self.idle_timeout, async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        });

        let result = match self.shutdown.as_mut() {
            Some(shutdown) => tokio::select! {
                result = write => result,
                _ = wait_for_shutdown(shutdown) => return Err(ConnectionError::Shutdown),
            },
            None => write.await,
        };

        result.map_err(|_| ConnectionError::Timeout(self.idle_timeout))??;

        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

impl<S> Drop for ConnectionHandler<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
        debug!(
            client = %self.addr,
            active = self.stats.active(),
            "Connection closed"
        );
    }
}

/// Resolves once the watched flag is `true`.
///
/// If the sender is gone without ever signalling, this never resolves.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected between commands
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command line or payload)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// No data arrived, or a reply could not be delivered, within the idle timeout
    #[error("Idle for more than {0:?}")]
    Timeout(Duration),

    /// Command line exceeded the maximum length without a CRLF
    #[error("Command line too long")]
    LineTooLong,

    /// A GIVE size could not be honoured, so payload boundaries are lost
    #[error("Payload framing lost")]
    FramingLost,

    /// The server is shutting down
    #[error("Server shutting down")]
    Shutdown,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    idle_timeout: Duration,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, idle_timeout, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
