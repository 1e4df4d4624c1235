// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use council_core::{
    FailureSignal, Phase, RecoveryAction, SendMode, SessionId, SessionRecord, WorkerIdentity,
    WorkerKey, WorkerStatus,
};
use council_daemon::lifecycle::{Config, LifecycleError};
use council_daemon::protocol::{self, ProtocolError};
use council_daemon::{BroadcastEntry, Request, Response, SessionSummary, STARTUP_MARKER_PREFIX};
use thiserror::Error;
use tokio::net::UnixStream;
use tracing::debug;

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for IPC requests. Capture and dispatch wait on a worker, so the
/// default sits above the daemon's own request timeout.
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("COUNCIL_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(15))
}

/// Timeout for waiting for daemon to start
pub fn timeout_connect() -> Duration {
    parse_duration_ms("COUNCIL_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for process to exit
pub fn timeout_exit() -> Duration {
    parse_duration_ms("COUNCIL_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

/// Polling interval for retries
pub fn poll_interval() -> Duration {
    parse_duration_ms("COUNCIL_POLL_INTERVAL_MS").unwrap_or(Duration::from_millis(50))
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("Connection timeout waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{message}")]
    Rejected {
        message: String,
        action: Option<RecoveryAction>,
    },

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(#[from] LifecycleError),
}

impl ClientError {
    /// Recovery hint attached by the daemon, if any
    pub fn action(&self) -> Option<&RecoveryAction> {
        match self {
            ClientError::Rejected { action, .. } => action.as_ref(),
            _ => None,
        }
    }
}

/// Map a response the caller did not expect onto an error
fn unexpected(response: Response) -> ClientError {
    match response {
        Response::Error { message, action } => ClientError::Rejected { message, action },
        Response::NotFound { session_id } => ClientError::NotFound(session_id),
        _ => ClientError::UnexpectedResponse,
    }
}

/// Daemon client
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to daemon, auto-starting if not running
    pub async fn connect_or_start(config: &Config) -> Result<Self, ClientError> {
        // Restart a daemon left over from another version
        if let Ok(daemon_version) = std::fs::read_to_string(&config.version_path) {
            if daemon_version.trim() != env!("CARGO_PKG_VERSION") {
                debug!(
                    daemon = daemon_version.trim(),
                    cli = env!("CARGO_PKG_VERSION"),
                    "version mismatch, restarting daemon"
                );
                let _ = daemon_stop(config).await;
            }
        }

        match Self::connect(config) {
            Ok(client) => Ok(client),
            Err(ClientError::DaemonNotRunning) => {
                let child = start_daemon_background()?;
                debug!(pid = child.id(), "started councild");
                Self::connect_with_retry(config, timeout_connect(), child).await
            }
            Err(e) => Err(wrap_with_startup_error(e, config)),
        }
    }

    /// Connect to existing daemon (no auto-start)
    pub fn connect(config: &Config) -> Result<Self, ClientError> {
        if !config.socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }
        Ok(Self::at(config.socket_path.clone()))
    }

    pub fn at(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    async fn connect_with_retry(
        config: &Config,
        timeout: Duration,
        mut child: std::process::Child,
    ) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            // Startup failure: the daemon exits before binding
            if let Ok(Some(status)) = child.try_wait() {
                let poll_start = Instant::now();
                while poll_start.elapsed() < timeout_exit() {
                    if let Some(err) = read_startup_error(&config.log_path) {
                        return Err(ClientError::DaemonStartFailed(err));
                    }
                    tokio::time::sleep(poll_interval()).await;
                }
                return Err(ClientError::DaemonStartFailed(format!(
                    "exited with {}",
                    status
                )));
            }

            match Self::connect(config) {
                Ok(client) => return Ok(client),
                Err(ClientError::DaemonNotRunning) => {
                    tokio::time::sleep(poll_interval()).await;
                }
                Err(e) => return Err(wrap_with_startup_error(e, config)),
            }
        }

        Err(wrap_with_startup_error(ClientError::DaemonStartTimeout, config))
    }

    /// Send a request and receive a response with specific timeouts
    async fn send_with_timeout(
        &self,
        request: Request,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(&request)?;
        tokio::time::timeout(write_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes =
            tokio::time::timeout(read_timeout, protocol::read_message(&mut reader))
                .await
                .map_err(|_| ProtocolError::Timeout)??;

        let response: Response = protocol::decode(&response_bytes)?;
        Ok(response)
    }

    /// Send a request and receive a response
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        self.send_with_timeout(request, timeout_ipc(), timeout_ipc())
            .await
    }

    /// Get daemon version via Hello handshake
    pub async fn hello(&self) -> Result<String, ClientError> {
        match self
            .send(Request::Hello {
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await?
        {
            Response::Hello { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<Response, ClientError> {
        match self.send(Request::Status).await? {
            status @ Response::Status { .. } => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// Request daemon shutdown
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(Request::Shutdown).await? {
            Response::Ok | Response::ShuttingDown => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn create_session(&self) -> Result<SessionId, ClientError> {
        match self.send(Request::CreateSession).await? {
            Response::SessionCreated { session_id } => Ok(session_id),
            other => Err(unexpected(other)),
        }
    }

    /// Current state of a session, `None` if the daemon does not know it
    pub async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, ClientError> {
        match self
            .send(Request::GetSessionState {
                session_id: id.clone(),
            })
            .await?
        {
            Response::Session { session } => Ok(Some(*session)),
            Response::NotFound { .. } => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ClientError> {
        match self.send(Request::ListSessions).await? {
            Response::Sessions { sessions } => Ok(sessions),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status_update(
        &self,
        id: &SessionId,
        worker: &WorkerKey,
        status: WorkerStatus,
        error: Option<String>,
    ) -> Result<(), ClientError> {
        self.expect_ok(Request::StatusUpdate {
            session_id: id.clone(),
            worker: worker.clone(),
            status,
            error,
        })
        .await
    }

    pub async fn set_phase(&self, id: &SessionId, phase: Phase) -> Result<(), ClientError> {
        self.expect_ok(Request::SetPhase {
            session_id: id.clone(),
            phase,
        })
        .await
    }

    pub async fn attach_worker(
        &self,
        id: &SessionId,
        worker: &WorkerKey,
        identity: WorkerIdentity,
    ) -> Result<(), ClientError> {
        self.expect_ok(Request::AttachWorker {
            session_id: id.clone(),
            worker: worker.clone(),
            identity,
        })
        .await
    }

    pub async fn capture(&self, id: &SessionId, worker: &WorkerKey) -> Result<String, ClientError> {
        match self
            .send(Request::Capture {
                session_id: id.clone(),
                worker: worker.clone(),
            })
            .await?
        {
            Response::Captured { text } => Ok(text),
            other => Err(unexpected(other)),
        }
    }

    /// Returns the mode used, whether the prompt was delivered, and any
    /// platform warning
    pub async fn dispatch(
        &self,
        id: &SessionId,
        worker: &WorkerKey,
        prompt: String,
        mode: Option<SendMode>,
    ) -> Result<(SendMode, bool, Option<String>), ClientError> {
        match self
            .send(Request::Dispatch {
                session_id: id.clone(),
                worker: worker.clone(),
                prompt,
                mode,
            })
            .await?
        {
            Response::Dispatched {
                mode,
                delivered,
                warning,
            } => Ok((mode, delivered, warning)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn report_failure(
        &self,
        id: &SessionId,
        worker: Option<WorkerKey>,
        signal: FailureSignal,
    ) -> Result<RecoveryAction, ClientError> {
        match self
            .send(Request::ReportFailure {
                session_id: id.clone(),
                worker,
                signal,
            })
            .await?
        {
            Response::Recovery { action } => Ok(action),
            other => Err(unexpected(other)),
        }
    }

    pub async fn broadcast(
        &self,
        kind: String,
        payload: serde_json::Value,
    ) -> Result<Vec<BroadcastEntry>, ClientError> {
        match self.send(Request::Broadcast { kind, payload }).await? {
            Response::Broadcast { outcomes } => Ok(outcomes),
            other => Err(unexpected(other)),
        }
    }

    pub async fn end_session(&self, id: &SessionId) -> Result<(), ClientError> {
        self.expect_ok(Request::EndSession {
            session_id: id.clone(),
        })
        .await
    }

    pub async fn delete_session(&self, id: &SessionId) -> Result<(), ClientError> {
        self.expect_ok(Request::DeleteSession {
            session_id: id.clone(),
        })
        .await
    }

    async fn expect_ok(&self, request: Request) -> Result<(), ClientError> {
        match self.send(request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

/// Start the daemon in the background, returning the child process handle
fn start_daemon_background() -> Result<std::process::Child, ClientError> {
    let councild = find_daemon_binary();

    Command::new(&councild)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Stop the daemon (graceful first, then forceful)
/// Returns true if daemon was stopped, false if it wasn't running
pub async fn daemon_stop(config: &Config) -> Result<bool, ClientError> {
    let client = match DaemonClient::connect(config) {
        Ok(c) => c,
        Err(ClientError::DaemonNotRunning) => {
            cleanup_stale_pid(config);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let shutdown_result = client.shutdown().await;

    if let Some(pid) = read_daemon_pid(&config.lock_path) {
        if shutdown_result.is_ok() {
            wait_for_exit(pid, timeout_exit()).await;
        }

        if process_exists(pid) {
            force_kill_daemon(pid);
            wait_for_exit(pid, timeout_exit()).await;
        }
    }

    cleanup_stale_pid(config);
    Ok(true)
}

/// Wait for a process to exit
async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(poll_interval()).await;
    }
    false
}

/// Locate `councild`: explicit override, then next to this executable,
/// then the workspace debug build, then `PATH`
fn find_daemon_binary() -> PathBuf {
    if let Ok(path) = std::env::var("COUNCIL_DAEMON_BINARY") {
        return PathBuf::from(path);
    }

    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("councild")));
    let dev_build = Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(|root| root.join("target/debug/councild"));

    [sibling, dev_build]
        .into_iter()
        .flatten()
        .find(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from("councild"))
}

/// Remove a PID file left by a daemon that is no longer listening
fn cleanup_stale_pid(config: &Config) {
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

/// Get the PID from the daemon PID file, if it exists
pub fn read_daemon_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok())
}

/// Send `signal` to `pid` with kill(1); true if delivered
fn signal_pid(pid: u32, signal: &str) -> bool {
    Command::new("kill")
        .arg(signal)
        .arg(pid.to_string())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Signal 0 probes for the process without touching it
pub fn process_exists(pid: u32) -> bool {
    signal_pid(pid, "-0")
}

pub fn force_kill_daemon(pid: u32) -> bool {
    signal_pid(pid, "-9")
}

/// Errors logged since the most recent startup marker, one per line.
///
/// Tracing lines look like "timestamp LEVEL target: message"; only the
/// message part is kept.
pub fn read_startup_error(log_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(log_path).ok()?;
    let attempt = &content[content.rfind(STARTUP_MARKER_PREFIX)?..];

    let messages: Vec<&str> = attempt
        .lines()
        .filter(|line| line.contains(" ERROR ") || line.contains("Failed to start"))
        .map(|line| line.split_once(": ").map_or(line, |(_, message)| message))
        .collect();

    (!messages.is_empty()).then(|| messages.join("\n"))
}

/// Prefer the daemon's own startup error over a connection error
fn wrap_with_startup_error(err: ClientError, config: &Config) -> ClientError {
    if matches!(err, ClientError::DaemonStartFailed(_)) {
        return err;
    }
    read_startup_error(&config.log_path).map_or(err, ClientError::DaemonStartFailed)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
