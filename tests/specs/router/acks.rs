//! Acknowledgment specs
//!
//! A request resolves exactly once: by its ack, or by its deadline.

use crate::prelude::*;
use similar_asserts::assert_eq;
use std::time::{Duration, Instant};

async fn council_with_attached(answer: Answer) -> (Council, Worker, SessionId) {
    let council = Council::with_settings("request_timeout = \"300ms\"").await;
    let worker = Worker::spawn(council.workers_dir(), "tab-1", answer);
    let id = council.create_session().await;
    let response = council
        .request(Request::AttachWorker {
            session_id: id.clone(),
            worker: WorkerKey::from("claude"),
            identity: worker.identity.clone(),
        })
        .await;
    assert_eq!(response, Response::Ok);
    (council, worker, id)
}

fn capture(id: &SessionId) -> Request {
    Request::Capture {
        session_id: id.clone(),
        worker: WorkerKey::from("claude"),
    }
}

#[tokio::test]
async fn silent_worker_times_out_at_the_deadline() {
    let (council, _worker, id) = council_with_attached(Answer::Silent).await;

    let started = Instant::now();
    let response = council.request(capture(&id)).await;
    let elapsed = started.elapsed();

    match response {
        Response::Error { message, action } => {
            assert!(message.contains("no ack"), "{}", message);
            assert_eq!(action, None);
        }
        other => panic!("expected timeout error, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "{:?}", elapsed);
    // a timeout is not a disconnect
    assert_eq!(
        council.worker_status(&id, "claude").await,
        (WorkerStatus::Ready, None)
    );
}

#[tokio::test]
async fn ack_inside_the_deadline_wins() {
    let (council, _worker, id) = council_with_attached(Answer::Late(
        Duration::from_millis(50),
        json!({ "text": "just in time" }),
    ))
    .await;

    assert_eq!(
        council.request(capture(&id)).await,
        Response::Captured {
            text: "just in time".to_string()
        }
    );
}

#[tokio::test]
async fn late_ack_has_no_effect() {
    let (council, _worker, id) = council_with_attached(Answer::Late(
        Duration::from_millis(600),
        json!({ "text": "too late" }),
    ))
    .await;

    let response = council.request(capture(&id)).await;
    assert!(matches!(response, Response::Error { .. }), "{:?}", response);

    tokio::time::sleep(Duration::from_millis(500)).await;

    // the daemon keeps serving and the slot is untouched
    assert_eq!(council.request(Request::Ping).await, Response::Pong);
    assert_eq!(
        council.worker_status(&id, "claude").await,
        (WorkerStatus::Ready, None)
    );
}
