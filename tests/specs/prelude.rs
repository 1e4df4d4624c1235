// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness: a real daemon on a temp dir and scripted workers on
//! real sockets.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub use council_core::{
    kinds, Envelope, FailureSignal, Phase, RecoveryKind, SessionId, SessionRecord,
    WorkerIdentity, WorkerKey, WorkerStatus,
};
pub use council_daemon::lifecycle::{self, Config, DaemonState};
pub use council_daemon::protocol;
pub use council_daemon::{server, Request, Response};
pub use serde_json::json;

use council_adapters::{read_frame, write_frame};
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::task::{JoinHandle, JoinSet};

const WAIT: Duration = Duration::from_secs(5);

/// A running daemon driven the way `councild` drives it
pub struct Council {
    dir: TempDir,
    pub config: Config,
    task: JoinHandle<()>,
}

impl Council {
    pub async fn start() -> Self {
        Self::start_in(TempDir::new().unwrap()).await
    }

    /// Start with `council.toml` contents
    pub async fn with_settings(settings: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir);
        std::fs::create_dir_all(&config.state_dir).unwrap();
        std::fs::write(&config.settings_path, settings).unwrap();
        Self::start_in(dir).await
    }

    pub async fn start_in(dir: TempDir) -> Self {
        let config = config_for(&dir);
        let daemon = lifecycle::startup(&config).await.unwrap();
        let task = tokio::spawn(serve(daemon));
        Council { dir, config, task }
    }

    /// Send one request over the daemon socket
    pub async fn request(&self, request: Request) -> Response {
        let stream = tokio::net::UnixStream::connect(&self.config.socket_path)
            .await
            .unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let bytes = protocol::encode(&request).unwrap();
        protocol::write_message(&mut writer, &bytes).await.unwrap();
        let reply = tokio::time::timeout(WAIT, protocol::read_message(&mut reader))
            .await
            .unwrap()
            .unwrap();
        protocol::decode(&reply).unwrap()
    }

    pub async fn create_session(&self) -> SessionId {
        match self.request(Request::CreateSession).await {
            Response::SessionCreated { session_id } => session_id,
            other => panic!("expected session created, got {:?}", other),
        }
    }

    pub async fn session(&self, id: &SessionId) -> SessionRecord {
        match self
            .request(Request::GetSessionState {
                session_id: id.clone(),
            })
            .await
        {
            Response::Session { session } => *session,
            other => panic!("expected session, got {:?}", other),
        }
    }

    pub async fn worker_status(&self, id: &SessionId, key: &str) -> (WorkerStatus, Option<String>) {
        let record = self.session(id).await;
        let (_, state) = record
            .workers
            .into_iter()
            .find(|(k, _)| k.as_str() == key)
            .unwrap();
        (state.status, state.error)
    }

    /// Poll until the worker reaches `status`
    pub async fn wait_for_status(&self, id: &SessionId, key: &str, status: WorkerStatus) {
        let start = Instant::now();
        loop {
            if self.worker_status(id, key).await.0 == status {
                return;
            }
            if start.elapsed() > WAIT {
                panic!("{} never reached {}", key, status);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// (sessions_active, liveness_armed)
    pub async fn liveness(&self) -> (usize, bool) {
        match self.request(Request::Status).await {
            Response::Status {
                sessions_active,
                liveness_armed,
                ..
            } => (sessions_active, liveness_armed),
            other => panic!("expected status, got {:?}", other),
        }
    }

    pub fn workers_dir(&self) -> &Path {
        &self.config.workers_path
    }

    /// Graceful shutdown over IPC; returns the directory for a restart
    pub async fn stop(self) -> TempDir {
        assert!(matches!(
            self.request(Request::Shutdown).await,
            Response::ShuttingDown
        ));
        tokio::time::timeout(WAIT, self.task).await.unwrap().unwrap();
        self.dir
    }

    /// Drop the daemon without running shutdown, as a killed process would
    pub async fn kill(self) -> TempDir {
        self.task.abort();
        let _ = self.task.await;
        self.dir
    }
}

fn config_for(dir: &TempDir) -> Config {
    Config::under(
        &dir.path().join("state"),
        &dir.path().join("run"),
        &dir.path().join("sock"),
    )
}

/// The `councild` select loop without signals or the idle timer
async fn serve(mut daemon: DaemonState) {
    loop {
        tokio::select! {
            Ok((stream, _)) = daemon.listener.accept() => {
                let _ = server::handle_connection(&mut daemon, stream).await;
            }
            Some(event) = daemon.router_events.recv() => {
                daemon.coordinator.handle_event(event).await;
            }
        }
        if daemon.shutdown_requested {
            daemon.shutdown().await.unwrap();
            break;
        }
    }
}

/// How a scripted worker answers envelopes that need an ack
#[derive(Clone)]
pub enum Answer {
    /// Ack with this body
    Ack(serde_json::Value),
    /// Read and never answer
    Silent,
    /// Ack with this body after a delay
    Late(Duration, serde_json::Value),
}

/// A worker listening on `<workers_dir>/<identity>.sock`
pub struct Worker {
    pub identity: WorkerIdentity,
    seen: Arc<Mutex<Vec<Envelope>>>,
    task: JoinHandle<()>,
}

impl Worker {
    pub fn spawn(workers_dir: &Path, identity: &str, answer: Answer) -> Self {
        std::fs::create_dir_all(workers_dir).unwrap();
        let identity = WorkerIdentity::from(identity);
        let listener = UnixListener::bind(workers_dir.join(format!("{}.sock", identity))).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        let task = tokio::spawn(async move {
            // Dropping the set on abort closes every connection
            let mut connections = JoinSet::new();
            while let Ok((mut stream, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                let answer = answer.clone();
                connections.spawn(async move {
                    while let Ok(Some(envelope)) = read_frame(&mut stream).await {
                        log.lock().unwrap().push(envelope.clone());
                        if !envelope.needs_ack {
                            continue;
                        }
                        let body = match &answer {
                            Answer::Ack(body) => body.clone(),
                            Answer::Silent => continue,
                            Answer::Late(delay, body) => {
                                tokio::time::sleep(*delay).await;
                                body.clone()
                            }
                        };
                        let ack = Envelope::ack(&envelope.correlation_id, body);
                        if write_frame(&mut stream, &ack).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Worker {
            identity,
            seen,
            task,
        }
    }

    /// Kinds of every envelope received, in order
    pub fn seen_kinds(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.kind.clone())
            .collect()
    }

    /// Close the listener and every open connection
    pub async fn vanish(self, workers_dir: &Path) {
        self.task.abort();
        let _ = self.task.await;
        let _ = std::fs::remove_file(workers_dir.join(format!("{}.sock", self.identity)));
    }
}

/// A socket file nobody listens on
pub fn dead_socket(workers_dir: &Path, identity: &str) {
    std::fs::create_dir_all(workers_dir).unwrap();
    let path = workers_dir.join(format!("{}.sock", identity));
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
}
