//! Daemon lifecycle specs
//!
//! Verify startup, the single-instance lock and shutdown.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn daemon_answers_ping_and_hello() {
    let council = Council::start().await;

    assert_eq!(council.request(Request::Ping).await, Response::Pong);
    assert_eq!(
        council
            .request(Request::Hello {
                version: "0.1.0".to_string()
            })
            .await,
        Response::Hello {
            version: council_daemon::PROTOCOL_VERSION.to_string()
        }
    );
}

#[tokio::test]
async fn second_daemon_on_same_dirs_is_refused() {
    let council = Council::start().await;

    let err = lifecycle::startup(&council.config).await.err().unwrap();

    assert!(matches!(err, lifecycle::LifecycleError::LockFailed(_)));
    assert_eq!(council.request(Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn shutdown_removes_socket_and_pid() {
    let council = Council::start().await;
    let config = council.config.clone();
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());

    council.stop().await;

    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
    assert!(!config.version_path.exists());
}

#[tokio::test]
async fn status_reports_open_channels() {
    let council = Council::start().await;
    let worker = Worker::spawn(council.workers_dir(), "tab-1", Answer::Ack(json!({})));
    let id = council.create_session().await;
    council
        .request(Request::AttachWorker {
            session_id: id,
            worker: WorkerKey::from("chatgpt"),
            identity: worker.identity.clone(),
        })
        .await;

    match council.request(Request::Status).await {
        Response::Status {
            sessions_active,
            channels_open,
            liveness_armed,
            ..
        } => assert_eq!((sessions_active, channels_open, liveness_armed), (1, 1, true)),
        other => panic!("expected status, got {:?}", other),
    }
}

#[tokio::test]
async fn invalid_settings_prevent_startup() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Config::under(
        &dir.path().join("state"),
        &dir.path().join("run"),
        &dir.path().join("sock"),
    );
    std::fs::create_dir_all(&config.state_dir).unwrap();
    std::fs::write(&config.settings_path, "bogus_key = 1").unwrap();

    let err = lifecycle::startup(&config).await.err().unwrap();

    assert!(matches!(err, lifecycle::LifecycleError::Settings(_)));
    assert!(!config.socket_path.exists());
}
