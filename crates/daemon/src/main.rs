// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Council daemon (councild)
//!
//! Background coordinator that owns sessions, worker channels and the
//! liveness timer.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::fmt;
use std::time::Duration;

use council_daemon::lifecycle::{self, Config, DaemonState, LifecycleError};
use council_daemon::{server, STARTUP_MARKER_PREFIX};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// How often the loop wakes to check for idleness
const IDLE_CHECK: Duration = Duration::from_secs(1);

/// Why the event loop ended
enum Exit {
    Signal(&'static str),
    Requested,
    Idle,
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Signal(name) => write!(f, "received {}", name),
            Exit::Requested => write!(f, "shutdown requested via IPC"),
            Exit::Idle => write!(f, "no active sessions or channels"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    // Marker goes in before tracing so the CLI can find this attempt
    append_log_line(
        &config,
        &format!("{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id()),
    )?;

    let log_guard = setup_logging(&config)?;

    info!(state_dir = %config.state_dir.display(), "starting councild");

    let mut daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            // Synchronous: the non-blocking writer may not flush before exit
            let _ = append_log_line(&config, &format!("ERROR Failed to start daemon: {}", e));
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    info!(socket = %config.socket_path.display(), "daemon ready");

    // Signal ready for parent process (e.g., systemd, CLI waiting for startup)
    println!("READY");

    let exit = run(&mut daemon).await?;
    info!("{}, shutting down", exit);
    daemon.shutdown().await?;

    info!("daemon stopped");
    Ok(())
}

/// Serve clients and worker events until something ends the daemon
async fn run(daemon: &mut DaemonState) -> Result<Exit, std::io::Error> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            accepted = daemon.listener.accept() => match accepted {
                Ok((stream, _)) => {
                    if let Err(e) = server::handle_connection(daemon, stream).await {
                        error!("Error handling connection: {}", e);
                    }
                }
                Err(e) => error!("Error accepting connection: {}", e),
            },

            // Worker channel traffic and teardowns
            Some(event) = daemon.router_events.recv() => {
                daemon.coordinator.handle_event(event).await;
            }

            _ = tokio::time::sleep(IDLE_CHECK) => {
                if daemon.idle_expired() {
                    return Ok(Exit::Idle);
                }
            }

            _ = sigterm.recv() => return Ok(Exit::Signal("SIGTERM")),
            _ = sigint.recv() => return Ok(Exit::Signal("SIGINT")),
        }

        if daemon.shutdown_requested {
            return Ok(Exit::Requested);
        }
    }
}

/// Append one line to the log file outside of tracing
fn append_log_line(config: &Config, line: &str) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (Some(dir), Some(file)) = (config.log_path.parent(), config.log_path.file_name()) else {
        return Err(LifecycleError::NoStateDir);
    };
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    Ok(guard)
}
