//! Disconnect recovery specs
//!
//! Losing a worker's channel marks the slot disconnected and yields a
//! reopen hint; no signal deletes a session.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn worker_going_away_marks_slot_disconnected() {
    let council = Council::start().await;
    let worker = Worker::spawn(council.workers_dir(), "tab-2", Answer::Ack(json!({})));
    let id = council.create_session().await;
    let response = council
        .request(Request::AttachWorker {
            session_id: id.clone(),
            worker: WorkerKey::from("claude"),
            identity: worker.identity.clone(),
        })
        .await;
    assert_eq!(response, Response::Ok);

    worker.vanish(council.workers_dir()).await;
    council
        .wait_for_status(&id, "claude", WorkerStatus::NotConnected)
        .await;

    let record = council.session(&id).await;
    let (_, claude) = record
        .workers
        .iter()
        .find(|(key, _)| key.as_str() == "claude")
        .unwrap();
    assert_eq!(claude.channel, None);
    assert_eq!(claude.error.as_deref(), Some("disconnected"));
}

#[tokio::test]
async fn capture_from_vanished_worker_suggests_reopen() {
    let council = Council::start().await;
    let worker = Worker::spawn(council.workers_dir(), "tab-3", Answer::Ack(json!({})));
    let id = council.create_session().await;
    council
        .request(Request::AttachWorker {
            session_id: id.clone(),
            worker: WorkerKey::from("gemini"),
            identity: worker.identity.clone(),
        })
        .await;
    // Keep the channel but make the worker unreachable for new requests
    std::fs::remove_file(council.workers_dir().join("tab-3.sock")).unwrap();

    let response = council
        .request(Request::Capture {
            session_id: id.clone(),
            worker: WorkerKey::from("gemini"),
        })
        .await;

    match response {
        Response::Error {
            action: Some(action),
            ..
        } => {
            assert_eq!(action.action, RecoveryKind::ReopenWorker);
            assert!(action.recoverable);
            assert!(action.user_message.unwrap().contains("gemini"));
        }
        other => panic!("expected error with action, got {:?}", other),
    }
    assert_eq!(
        council.worker_status(&id, "gemini").await,
        (WorkerStatus::NotConnected, Some("disconnected".to_string()))
    );
}

#[tokio::test]
async fn reported_failures_follow_policy() {
    let council = Council::start().await;
    let id = council.create_session().await;

    let cases = [
        (
            FailureSignal::RateLimited,
            Some("chatgpt"),
            RecoveryKind::Retry,
            true,
        ),
        (
            FailureSignal::UiIncompatible,
            Some("claude"),
            RecoveryKind::FallbackManual,
            true,
        ),
        (
            FailureSignal::WorkerDisconnected,
            None,
            RecoveryKind::FallbackManual,
            false,
        ),
        (
            FailureSignal::Unknown,
            Some("grok"),
            RecoveryKind::FallbackManual,
            false,
        ),
    ];

    for (signal, worker, kind, recoverable) in cases {
        let response = council
            .request(Request::ReportFailure {
                session_id: id.clone(),
                worker: worker.map(WorkerKey::from),
                signal,
            })
            .await;
        match response {
            Response::Recovery { action } => {
                assert_eq!((action.action, action.recoverable), (kind, recoverable), "{}", signal);
            }
            other => panic!("expected recovery for {}, got {:?}", signal, other),
        }
    }

    assert_eq!(
        council.worker_status(&id, "chatgpt").await,
        (WorkerStatus::Error, Some("rate limited".to_string()))
    );
    assert_eq!(council.worker_status(&id, "claude").await.0, WorkerStatus::Error);
    // no signal deletes a session
    assert_eq!(council.session(&id).await.id, id);
}
