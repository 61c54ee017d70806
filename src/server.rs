//! TCP Listener and Accept Loop
//!
//! The server binds the configured address, accepts clients, and spawns one
//! [`ConnectionHandler`] task per connection. It owns the shutdown signal
//! that every handler watches.
//!
//! ```text
//!   Server::bind ──> run_until(shutdown)
//!                        │
//!        ┌───────────────┼─────────────────────┐
//!        ▼               ▼                     ▼
//!    accept()      join finished tasks     shutdown fires
//!        │                                     │
//!        ▼                                     ▼
//!   spawn handler                    signal handlers, drain
//! ```
//!
//! Bind failures are returned to the caller. Transient accept failures
//! (aborted handshakes, descriptor exhaustion) are logged and retried after a
//! short pause; any other accept failure stops the server.

use crate::commands::CommandHandler;
use crate::connection::{ConnectionHandler, ConnectionStats};
use crate::queue::MessageQueue;
use crate::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Pause after a transient accept failure
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long shutdown waits for open connections before aborting them
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Idle time after which a silent client is disconnected
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be created
    #[error("could not bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The listener failed in a way that retrying will not fix
    #[error("could not accept connections: {0}")]
    Accept(#[source] io::Error),
}

/// A bound Lineup server.
///
/// # Example
///
/// ```no_run
/// use lineup::queue::MessageQueue;
/// use lineup::server::{Server, ServerConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), lineup::server::ServerError> {
/// let queue = Arc::new(MessageQueue::new());
/// let server = Server::bind(ServerConfig::default(), queue).await?;
/// server.run_until(tokio::signal::ctrl_c()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    queue: Arc<MessageQueue>,
    stats: Arc<ConnectionStats>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(config: ServerConfig, queue: Arc<MessageQueue>) -> Result<Self, ServerError> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            queue,
            stats: Arc::new(ConnectionStats::new()),
            shutdown_tx,
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// The queue shared by all connections.
    pub fn queue(&self) -> Arc<MessageQueue> {
        Arc::clone(&self.queue)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accepts connections forever.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accepts connections until `shutdown` resolves, then asks every open
    /// connection to close and waits for them.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future,
    {
        match self.local_addr() {
            Ok(addr) => info!(address = %addr, "Waiting for connections"),
            Err(_) => info!(address = %self.config.bind_address(), "Waiting for connections"),
        }

        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_handler(&mut tasks, stream, addr),
                    Err(e) if is_transient(&e) => {
                        warn!(error = %e, "Failed to accept connection, retrying");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed");
                        break Err(ServerError::Accept(e));
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Connection task panicked");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping server...");
                    break Ok(());
                }
            }
        };

        self.drain(tasks).await;
        result
    }

    fn spawn_handler(
        &self,
        tasks: &mut JoinSet<()>,
        stream: TcpStream,
        addr: SocketAddr,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(client = %addr, error = %e, "Could not set TCP_NODELAY");
        }

        let handler = ConnectionHandler::new(
            stream,
            addr,
            CommandHandler::new(Arc::clone(&self.queue)),
            self.config.timeout,
            Arc::clone(&self.stats),
        )
        .with_shutdown(self.shutdown_tx.subscribe());

        info!(
            client = %addr,
            active = self.stats.active(),
            total = self.stats.total(),
            "Client connected"
        );

        tasks.spawn(async move {
            if let Err(e) = handler.run().await {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        });
    }

    /// Signals every handler to stop and waits for them to finish.
    async fn drain(&self, mut tasks: JoinSet<()>) {
        let _ = self.shutdown_tx.send(true);

        if tasks.is_empty() {
            return;
        }

        info!(connections = tasks.len(), "Closing open connections");
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "Connections did not close in time, aborting them"
            );
            tasks.shutdown().await;
        }
    }
}

/// Accept errors that concern a single incoming connection or a momentary
/// resource shortage rather than the listener itself.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || out_of_descriptors(e)
}

/// EMFILE / ENFILE
#[cfg(unix)]
fn out_of_descriptors(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(23) | Some(24))
}

#[cfg(not(unix))]
fn out_of_descriptors(_: &io::Error) -> bool {
    false
}
