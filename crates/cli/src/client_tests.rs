// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for daemon client behavior.

use super::*;
use council_core::RecoveryKind;
use std::fs;
use tempfile::{tempdir, TempDir};
use tokio::net::UnixListener;

fn config(dir: &TempDir) -> Config {
    Config::under(
        &dir.path().join("state"),
        &dir.path().join("run"),
        &dir.path().join("sock"),
    )
}

/// Serve one connection, answering any request with `response`
fn serve_once(config: &Config, response: Response) -> tokio::task::JoinHandle<Request> {
    fs::create_dir_all(config.socket_path.parent().unwrap()).unwrap();
    let listener = UnixListener::bind(&config.socket_path).unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let bytes = protocol::read_message(&mut reader).await.unwrap();
        let request: Request = protocol::decode(&bytes).unwrap();
        let reply = protocol::encode(&response).unwrap();
        protocol::write_message(&mut writer, &reply).await.unwrap();
        request
    })
}

/// connect() must not delete state files when the daemon is mid-startup
/// and has written its pid but not yet bound the socket.
#[test]
fn connect_does_not_delete_pid_file() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    fs::create_dir_all(&config.state_dir).unwrap();
    fs::write(&config.lock_path, "12345\n").unwrap();

    let result = DaemonClient::connect(&config);

    assert!(matches!(result, Err(ClientError::DaemonNotRunning)));
    assert!(config.lock_path.exists(), "connect() must not delete pid file");
}

#[test]
fn pid_file_is_parsed_with_trailing_newline() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("councild.pid");
    fs::write(&path, "4242\n").unwrap();
    assert_eq!(read_daemon_pid(&path), Some(4242));

    fs::write(&path, "").unwrap();
    assert_eq!(read_daemon_pid(&path), None);
    assert_eq!(read_daemon_pid(&dir.path().join("missing")), None);
}

#[test]
fn startup_error_only_reads_latest_attempt() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("councild.log");
    let content = format!(
        "{p}1) ---\n2026-01-01T00:00:00Z ERROR councild: old failure\n\
         {p}2) ---\n2026-01-01T00:00:01Z  INFO councild: Starting councild\n\
         2026-01-01T00:00:01Z ERROR councild: Failed to start daemon: lock held\n",
        p = STARTUP_MARKER_PREFIX
    );
    fs::write(&log, content).unwrap();

    assert_eq!(
        read_startup_error(&log).as_deref(),
        Some("Failed to start daemon: lock held")
    );
}

#[test]
fn clean_startup_has_no_error() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("councild.log");
    fs::write(
        &log,
        format!("{}7) ---\nINFO councild: Daemon ready\n", STARTUP_MARKER_PREFIX),
    )
    .unwrap();
    assert_eq!(read_startup_error(&log), None);
}

#[tokio::test]
async fn capture_returns_worker_text() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    let server = serve_once(
        &config,
        Response::Captured {
            text: "hello".to_string(),
        },
    );

    let client = DaemonClient::connect(&config).unwrap();
    let text = client
        .capture(&SessionId::from("S1"), &WorkerKey::from("claude"))
        .await
        .unwrap();

    assert_eq!(text, "hello");
    assert_eq!(
        server.await.unwrap(),
        Request::Capture {
            session_id: SessionId::from("S1"),
            worker: WorkerKey::from("claude"),
        }
    );
}

#[tokio::test]
async fn error_response_keeps_recovery_action() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    let action = RecoveryAction::recoverable(RecoveryKind::ReopenWorker, "Reopen the tab");
    serve_once(
        &config,
        Response::Error {
            message: "worker unreachable".to_string(),
            action: Some(action.clone()),
        },
    );

    let client = DaemonClient::connect(&config).unwrap();
    let err = client
        .attach_worker(
            &SessionId::from("S1"),
            &WorkerKey::from("claude"),
            WorkerIdentity::from("tab-9"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "worker unreachable");
    assert_eq!(err.action(), Some(&action));
}

#[tokio::test]
async fn unknown_session_is_none_for_get() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    serve_once(
        &config,
        Response::NotFound {
            session_id: SessionId::from("ghost"),
        },
    );

    let client = DaemonClient::connect(&config).unwrap();
    let state = client.get_session(&SessionId::from("ghost")).await.unwrap();
    assert_eq!(state, None);
}

#[tokio::test]
async fn unknown_session_is_error_elsewhere() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    serve_once(
        &config,
        Response::NotFound {
            session_id: SessionId::from("ghost"),
        },
    );

    let client = DaemonClient::connect(&config).unwrap();
    let err = client
        .set_phase(&SessionId::from("ghost"), Phase::Stage2)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound(id) if id == SessionId::from("ghost")));
}

#[tokio::test]
async fn mismatched_response_is_unexpected() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    serve_once(&config, Response::Pong);

    let client = DaemonClient::connect(&config).unwrap();
    let err = client.create_session().await.unwrap_err();
    assert!(matches!(err, ClientError::UnexpectedResponse));
}

#[tokio::test]
async fn stop_without_daemon_clears_stale_pid() {
    let dir = tempdir().unwrap();
    let config = config(&dir);
    fs::create_dir_all(&config.state_dir).unwrap();
    fs::write(&config.lock_path, "999999\n").unwrap();

    let stopped = daemon_stop(&config).await.unwrap();

    assert!(!stopped);
    assert!(!config.lock_path.exists());
}
