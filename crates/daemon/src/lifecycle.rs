// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use council_adapters::{TracedTransport, UnixSocketTransport};
use council_core::{SystemClock, UuidIdGen};
use council_engine::RouterEvent;
use council_storage::{JsonDirStore, StoreError, TieredStore};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::settings::{Settings, SettingsError};

/// Worker transport used by the daemon (wrapped with tracing)
pub type DaemonTransport = TracedTransport<UnixSocketTransport>;

/// Coordinator with concrete transport, clock and ids
pub type DaemonCoordinator = Coordinator<DaemonTransport, SystemClock, UuidIdGen>;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the lock, log, settings and durable sessions
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to version file
    pub version_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Optional `council.toml`
    pub settings_path: PathBuf,
    /// Volatile tier: survives daemon restarts, cleared with the host
    pub volatile_path: PathBuf,
    /// Durable tier: survives host restarts
    pub durable_path: PathBuf,
    /// Where workers put their sockets
    pub workers_path: PathBuf,
}

impl Config {
    /// Resolve paths from the environment
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::under(&state_dir()?, &runtime_dir(), &socket_dir()))
    }

    /// Lay out every path under explicit base directories
    pub fn under(state_dir: &Path, runtime_dir: &Path, socket_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            socket_path: socket_dir.join("councild.sock"),
            lock_path: state_dir.join("councild.pid"),
            version_path: state_dir.join("councild.version"),
            log_path: state_dir.join("councild.log"),
            settings_path: state_dir.join("council.toml"),
            volatile_path: runtime_dir.join("sessions"),
            durable_path: state_dir.join("sessions"),
            workers_path: socket_dir.join("workers"),
        }
    }
}

/// Daemon state during operation
pub struct DaemonState {
    /// Configuration
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// Unix socket listener
    pub listener: UnixListener,
    pub coordinator: DaemonCoordinator,
    /// Events from worker channels, fed back into the coordinator
    pub router_events: mpsc::UnboundedReceiver<RouterEvent>,
    /// When daemon started
    pub start_time: Instant,
    /// Last client request
    pub last_activity: Instant,
    /// Shutdown requested flag
    pub shutdown_requested: bool,
}

impl DaemonState {
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Nothing to keep alive for, and no client for the configured idle period
    pub fn idle_expired(&self) -> bool {
        self.coordinator.is_idle()
            && self.last_activity.elapsed() >= self.coordinator.settings().idle_shutdown
    }

    /// Shutdown the daemon gracefully
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        // 1. Close worker channels and flush sessions to both tiers
        self.coordinator.shutdown().await;

        // 2. Remove socket file
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            }
        }

        // 3. Remove PID file
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        // 4. Remove version file
        if self.config.version_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.version_path) {
                warn!("Failed to remove version file: {}", e);
            }
        }

        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session recovery failed: {0}")]
    Recovery(#[from] CoordinatorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // Everything on disk belongs to the daemon holding the lock
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory (needed for lock, log, etc.)
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    use std::io::Write;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Create directories
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.workers_path)?;

    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    // 4. Load settings BEFORE binding socket (fail fast)
    let settings = Settings::load(&config.settings_path)?;

    // 5. Open both store tiers
    let store = TieredStore::new(
        JsonDirStore::open(&config.volatile_path)?,
        JsonDirStore::open(&config.durable_path)?,
    );

    // 6. Wire the coordinator and run restart recovery
    let transport = TracedTransport::new(UnixSocketTransport::new(&config.workers_path));
    let (mut coordinator, router_events) =
        Coordinator::new(settings, store, transport, SystemClock, UuidIdGen);
    let action = coordinator.restore().await?;
    info!(
        summary = action.user_message.as_deref().unwrap_or_default(),
        "restart recovery complete"
    );

    // 7. Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!("Daemon started, socket at {}", config.socket_path.display());

    let now = Instant::now();
    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        coordinator,
        router_events,
        start_time: now,
        last_activity: now,
        shutdown_requested: false,
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }

    if config.version_path.exists() {
        let _ = std::fs::remove_file(&config.version_path);
    }

    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

/// State directory: `COUNCIL_STATE_DIR`, else the platform state dir
fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("COUNCIL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
        .map(|dir| dir.join("council"))
        .ok_or(LifecycleError::NoStateDir)
}

/// Runtime directory, cleared when the host restarts
fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("COUNCIL_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("council")
}

/// Get the socket directory for council
///
/// Uses /tmp/council by default to keep paths short (macOS SUN_LEN = 104).
/// Can be overridden with COUNCIL_SOCKET_DIR for testing.
fn socket_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("COUNCIL_SOCKET_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("/tmp/council")
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
