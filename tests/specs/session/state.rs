//! Session state specs
//!
//! Status updates, phases and deletion as seen through the command surface.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn new_session_has_every_worker_not_connected() {
    let council = Council::start().await;
    let id = council.create_session().await;

    let record = council.session(&id).await;

    assert_eq!(record.phase, Phase::Idle);
    let slots: Vec<(String, WorkerStatus)> = record
        .workers
        .iter()
        .map(|(key, state)| (key.to_string(), state.status))
        .collect();
    assert_eq!(
        slots,
        vec![
            ("chatgpt".to_string(), WorkerStatus::NotConnected),
            ("claude".to_string(), WorkerStatus::NotConnected),
            ("gemini".to_string(), WorkerStatus::NotConnected),
            ("grok".to_string(), WorkerStatus::NotConnected),
        ]
    );
}

#[tokio::test]
async fn status_update_is_visible_in_state() {
    let council = Council::start().await;
    let id = council.create_session().await;

    let response = council
        .request(Request::StatusUpdate {
            session_id: id.clone(),
            worker: WorkerKey::from("claude"),
            status: WorkerStatus::Error,
            error: Some("boom".to_string()),
        })
        .await;

    assert_eq!(response, Response::Ok);
    assert_eq!(
        council.worker_status(&id, "claude").await,
        (WorkerStatus::Error, Some("boom".to_string()))
    );
}

#[tokio::test]
async fn phase_changes_are_persisted() {
    let council = Council::start().await;
    let id = council.create_session().await;

    let response = council
        .request(Request::SetPhase {
            session_id: id.clone(),
            phase: Phase::Stage2,
        })
        .await;

    assert_eq!(response, Response::Ok);
    assert_eq!(council.session(&id).await.phase, Phase::Stage2);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let council = Council::start().await;
    let ghost = SessionId::from("no-such-session");

    let response = council
        .request(Request::GetSessionState {
            session_id: ghost.clone(),
        })
        .await;

    assert_eq!(response, Response::NotFound { session_id: ghost });
}

#[tokio::test]
async fn deleted_session_is_gone_from_both_tiers() {
    let council = Council::start().await;
    let id = council.create_session().await;
    let file = format!("session:{}.json", id);
    assert!(council.config.volatile_path.join(&file).exists());
    assert!(council.config.durable_path.join(&file).exists());

    let response = council
        .request(Request::DeleteSession {
            session_id: id.clone(),
        })
        .await;

    assert_eq!(response, Response::Ok);
    assert!(!council.config.volatile_path.join(&file).exists());
    assert!(!council.config.durable_path.join(&file).exists());
    assert_eq!(
        council
            .request(Request::GetSessionState {
                session_id: id.clone()
            })
            .await,
        Response::NotFound { session_id: id }
    );
}
