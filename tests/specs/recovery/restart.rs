//! Restart recovery specs
//!
//! A coordinator that starts over the same directories restores every
//! session and re-arms liveness for each.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn killed_daemon_restores_sessions_on_start() {
    let council = Council::start().await;
    let first = council.create_session().await;
    let second = council.create_session().await;
    council
        .request(Request::SetPhase {
            session_id: first.clone(),
            phase: Phase::Stage3,
        })
        .await;

    let dir = council.kill().await;
    let council = Council::start_in(dir).await;

    assert_eq!(council.liveness().await, (2, true));
    assert_eq!(council.session(&first).await.phase, Phase::Stage3);
    assert_eq!(council.session(&second).await.phase, Phase::Idle);
}

#[tokio::test]
async fn coordinator_restarted_reports_count() {
    let council = Council::start().await;
    let id = council.create_session().await;
    council.create_session().await;

    let response = council
        .request(Request::ReportFailure {
            session_id: id,
            worker: None,
            signal: FailureSignal::CoordinatorRestarted,
        })
        .await;

    match response {
        Response::Recovery { action } => {
            assert_eq!(action.action, RecoveryKind::ResumeSession);
            assert!(action.recoverable);
            assert_eq!(action.user_message.as_deref(), Some("Recovered 2 session(s)"));
        }
        other => panic!("expected recovery, got {:?}", other),
    }
    assert_eq!(council.liveness().await, (2, true));
}

#[tokio::test]
async fn restart_rebinds_live_workers_and_drops_dead_ones() {
    let council = Council::start().await;
    let alive = Worker::spawn(council.workers_dir(), "tab-1", Answer::Ack(json!({ "text": "still here" })));
    let doomed = Worker::spawn(council.workers_dir(), "tab-2", Answer::Ack(json!({})));
    let id = council.create_session().await;
    for (key, worker) in [("claude", &alive), ("gemini", &doomed)] {
        council
            .request(Request::AttachWorker {
                session_id: id.clone(),
                worker: WorkerKey::from(key),
                identity: worker.identity.clone(),
            })
            .await;
    }

    let dir = council.kill().await;
    let workers_dir = dir.path().join("sock/workers");
    doomed.vanish(&workers_dir).await;
    let council = Council::start_in(dir).await;

    assert_eq!(council.worker_status(&id, "claude").await.0, WorkerStatus::Ready);
    assert_eq!(
        council.worker_status(&id, "gemini").await,
        (WorkerStatus::NotConnected, Some("disconnected".to_string()))
    );
    assert_eq!(
        council
            .request(Request::Capture {
                session_id: id,
                worker: WorkerKey::from("claude"),
            })
            .await,
        Response::Captured {
            text: "still here".to_string()
        }
    );
}

#[tokio::test]
async fn graceful_stop_keeps_sessions_for_next_start() {
    let council = Council::start().await;
    let id = council.create_session().await;

    let dir = council.stop().await;
    let council = Council::start_in(dir).await;

    assert_eq!(council.session(&id).await.id, id);
}
