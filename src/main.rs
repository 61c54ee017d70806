//! lineupd - the Lineup priority message queue daemon
//!
//! This is the main entry point for the Lineup server. It parses the
//! command line, sets up logging, optionally detaches into the background,
//! writes the pid file, and runs the server until SIGINT/SIGTERM.

use anyhow::Context;
use clap::Parser;
use lineup::queue::MessageQueue;
use lineup::server::{Server, ServerConfig};
use lineup::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{self, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Command-line flags
#[derive(Debug, Parser)]
#[command(name = "lineupd", version, about = "In-memory priority message queue server", long_about = None)]
struct Cli {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to run the server on
    #[arg(short, long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Number of seconds to wait before disconnecting inactive clients
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Detach from the controlling terminal and run in the background
    #[arg(short, long)]
    daemonize: bool,

    /// Append log output to this file
    #[arg(short, long)]
    logfile: Option<PathBuf>,

    /// Write the server's process id to this file
    #[arg(long)]
    pidfile: Option<PathBuf>,

    /// Set on the re-executed background process
    #[arg(long, hide = true)]
    detached: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            timeout: Duration::from_secs(self.timeout),
        }
    }

    /// Arguments for the background copy of this process.
    fn detached_args(&self) -> Vec<String> {
        let mut args = vec![
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--timeout".to_string(),
            self.timeout.to_string(),
            "--detached".to_string(),
        ];
        if let Some(path) = &self.logfile {
            args.push("--logfile".to_string());
            args.push(path.display().to_string());
        }
        if let Some(path) = &self.pidfile {
            args.push("--pidfile".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}

/// Line the background process sends its parent once it is serving.
const READY: &str = "ready";

/// Re-executes this binary in the background with no terminal attached,
/// then exits the foreground process.
///
/// The parent waits until the background copy has opened its log file,
/// bound the port and written the pid file, so startup failures still end
/// the foreground process with a non-zero status.
fn daemonize(cli: &Cli) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("couldn't locate the lineupd executable")?;
    let mut command = process::Command::new(exe);
    command
        .args(cli.detached_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    // Own process group, so terminal Ctrl+C no longer reaches it
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().context("couldn't fork")?;
    let status = child
        .stdout
        .take()
        .context("background process has no status pipe")?;

    if let Err(e) = await_startup(BufReader::new(status)) {
        // The child exits on its own after reporting; reap it if it hasn't
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }

    println!("lineupd running in the background (pid {})", child.id());
    process::exit(0);
}

/// Reads the background process's startup report.
fn await_startup(mut reader: impl BufRead) -> anyhow::Result<()> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("couldn't read startup status from the background process")?;

    match line.trim_end() {
        READY => Ok(()),
        "" => anyhow::bail!("background process exited before it was ready"),
        failure => anyhow::bail!("background process failed to start: {failure}"),
    }
}

/// Tells the foreground parent how startup went.
///
/// Only used when detached, where stdout is the parent's status pipe.
fn report_startup(message: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{message}");
    let _ = stdout.flush();
}

/// Installs the global subscriber.
///
/// Logs go to stdout unless detached, and additionally to `logfile` when set.
/// `RUST_LOG` overrides the default `info` level.
fn init_logging(logfile: Option<&Path>, detached: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("couldn't open logfile `{}'", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let stdout_layer = (!detached).then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn write_pidfile(path: &Path) -> anyhow::Result<()> {
    fs::write(path, format!("{}\n", process::id()))
        .with_context(|| format!("couldn't write to pidfile `{}'", path.display()))
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
Lineup v{} - In-Memory Priority Message Queue
──────────────────────────────────────────────
Listening on {} (idle timeout {}s)
Use Ctrl+C to shutdown gracefully.
"#,
        lineup::VERSION,
        config.bind_address(),
        config.timeout.as_secs()
    );
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Everything that has to succeed before the server counts as running.
async fn start(cli: &Cli, queue: Arc<MessageQueue>) -> anyhow::Result<Server> {
    init_logging(cli.logfile.as_deref(), cli.detached)?;

    let config = cli.server_config();
    if !cli.detached {
        print_banner(&config);
    }

    let server = Server::bind(config, queue)
        .await
        .context("could not start server")?;

    if let Some(path) = &cli.pidfile {
        write_pidfile(path)?;
    }

    Ok(server)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.daemonize && !cli.detached {
        daemonize(&cli)?;
    }

    // The queue is the only state shared across connections
    let queue = Arc::new(MessageQueue::new());

    let server = match start(&cli, Arc::clone(&queue)).await {
        Ok(server) => server,
        Err(e) => {
            if cli.detached {
                report_startup(&format!("{e:#}"));
            }
            return Err(e);
        }
    };

    if cli.detached {
        report_startup(READY);
    }

    let result = server.run_until(shutdown_signal()).await;

    if let Some(path) = &cli.pidfile {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = %path.display(), "Couldn't remove pidfile");
        }
    }

    let stats = queue.stats();
    info!(
        pending = stats.len,
        given = stats.gives,
        taken = stats.takes,
        "Server shutdown complete"
    );

    result.context("server stopped unexpectedly")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["lineupd"]).unwrap();
        let config = cli.server_config();

        assert_eq!(config.port, 9876);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!cli.daemonize);
        assert!(cli.logfile.is_none());
        assert!(cli.pidfile.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "lineupd",
            "--port",
            "7000",
            "--timeout",
            "5",
            "--logfile",
            "lineupd.log",
            "--pidfile",
            "lineupd.pid",
            "-d",
        ])
        .unwrap();

        assert!(cli.daemonize);
        assert_eq!(cli.server_config().port, 7000);
        assert_eq!(cli.server_config().timeout, Duration::from_secs(5));

        let args = cli.detached_args();
        assert!(args.contains(&"--detached".to_string()));
        assert!(args.contains(&"lineupd.log".to_string()));
        assert!(!args.contains(&"-d".to_string()));
    }

    #[test]
    fn test_startup_ready() {
        assert!(await_startup(io::Cursor::new("ready\n")).is_ok());
    }

    #[test]
    fn test_startup_failure_is_reported() {
        let err = await_startup(io::Cursor::new(
            "could not start server: could not bind 0.0.0.0:9876: Address in use\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("could not bind 0.0.0.0:9876"));
    }

    #[test]
    fn test_startup_silent_exit_is_a_failure() {
        assert!(await_startup(io::Cursor::new("")).is_err());
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        assert!(Cli::try_parse_from(["lineupd", "--port", "0"]).is_err());
        assert!(Cli::try_parse_from(["lineupd", "--port", "70000"]).is_err());
        assert!(Cli::try_parse_from(["lineupd", "--timeout", "0"]).is_err());
    }
}
