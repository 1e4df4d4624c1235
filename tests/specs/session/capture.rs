//! Capture and dispatch specs
//!
//! A worker bound to a session answers capture and prompt requests over
//! its socket.

use crate::prelude::*;
use similar_asserts::assert_eq;

async fn attach(council: &Council, id: &SessionId, key: &str, identity: &WorkerIdentity) {
    let response = council
        .request(Request::AttachWorker {
            session_id: id.clone(),
            worker: WorkerKey::from(key),
            identity: identity.clone(),
        })
        .await;
    assert_eq!(response, Response::Ok);
}

#[tokio::test]
async fn create_and_capture() {
    let council = Council::start().await;
    let worker = Worker::spawn(
        council.workers_dir(),
        "tab-1",
        Answer::Ack(json!({ "text": "The answer is 42" })),
    );

    let id = council.create_session().await;
    attach(&council, &id, "claude", &worker.identity).await;
    assert_eq!(
        council.worker_status(&id, "claude").await,
        (WorkerStatus::Ready, None)
    );

    let response = council
        .request(Request::Capture {
            session_id: id.clone(),
            worker: WorkerKey::from("claude"),
        })
        .await;

    assert_eq!(
        response,
        Response::Captured {
            text: "The answer is 42".to_string()
        }
    );
    assert_eq!(worker.seen_kinds(), vec![kinds::CAPTURE.to_string()]);
}

#[tokio::test]
async fn capture_error_reply_is_reported() {
    let council = Council::start().await;
    let worker = Worker::spawn(
        council.workers_dir(),
        "tab-1",
        Answer::Ack(json!({ "error": "no response found" })),
    );
    let id = council.create_session().await;
    attach(&council, &id, "gemini", &worker.identity).await;

    let response = council
        .request(Request::Capture {
            session_id: id.clone(),
            worker: WorkerKey::from("gemini"),
        })
        .await;

    match response {
        Response::Error { message, .. } => assert!(message.contains("no response found")),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn capture_from_unattached_worker_fails() {
    let council = Council::start().await;
    let id = council.create_session().await;

    let response = council
        .request(Request::Capture {
            session_id: id.clone(),
            worker: WorkerKey::from("chatgpt"),
        })
        .await;

    assert!(matches!(response, Response::Error { .. }));
}

#[tokio::test]
async fn grok_prompts_stay_manual() {
    let council = Council::start().await;
    let worker = Worker::spawn(council.workers_dir(), "tab-4", Answer::Ack(json!({})));
    let id = council.create_session().await;
    attach(&council, &id, "grok", &worker.identity).await;

    let response = council
        .request(Request::Dispatch {
            session_id: id.clone(),
            worker: WorkerKey::from("grok"),
            prompt: "Summarize".to_string(),
            mode: Some(council_core::SendMode::Automated),
        })
        .await;

    match response {
        Response::Dispatched {
            mode, delivered, ..
        } => {
            assert_eq!(mode, council_core::SendMode::Manual);
            assert!(!delivered);
        }
        other => panic!("expected dispatched, got {:?}", other),
    }
    assert_eq!(
        council.worker_status(&id, "grok").await,
        (WorkerStatus::AwaitingDispatch, None)
    );
    assert!(!worker
        .seen_kinds()
        .contains(&kinds::PREPARE_PROMPT.to_string()));
}
